//! DNS-related modules.

pub mod blocker;
pub mod classifier;
pub mod reply;
pub mod resolver;

pub use blocker::BlockSet;
pub use classifier::{Classification, Classifier, Verdict};
pub use resolver::{DnsResolver, UpstreamResolver};

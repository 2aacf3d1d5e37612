//! Focusguard - a local DNS filter for staying off distracting sites.
//!
//! Focusguard answers DNS queries on the local machine, refuses the ones
//! that fall under a configured list of domains, and relays everything else
//! to an upstream resolver. Blocking can be suspended for a short window
//! through a local control socket, which also reports usage statistics.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`dns`]: Block matching, classification, replies and upstream forwarding
//! - [`pause`]: Timed suspension of blocking
//! - [`stats`]: Persistent request ledger and per-second activity ring
//! - [`control`]: Control-socket protocol, server and client
//! - [`query_log`]: Per-query JSON line sink
//! - [`system_dns`]: Redirecting the OS resolver to the daemon
//! - [`server`]: UDP server orchestration
//! - [`metrics`]: Prometheus counters
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The query pipeline is generic over [`dns::DnsResolver`], so it can be
//! driven without network access:
//!
//! ```rust
//! use focusguard::dns::BlockSet;
//!
//! let blocked = BlockSet::new(["social.example"]);
//! assert!(blocked.is_blocked("feed.social.example."));
//! assert!(!blocked.is_blocked("example.org."));
//! ```

pub mod config;
pub mod control;
pub mod dns;
pub mod error;
pub mod metrics;
pub mod pause;
pub mod query_log;
pub mod server;
pub mod stats;
pub mod system_dns;

pub use config::Config;
pub use error::{Error, Result};

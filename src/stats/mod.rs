//! Query statistics: the cumulative ledger and the rolling activity ring.

pub mod activity;
pub mod ledger;

pub use activity::{ACTIVITY_SLOTS, ActivityRing};
pub use ledger::{DomainCount, PauseStats, RequestCounts, StatsLedger};

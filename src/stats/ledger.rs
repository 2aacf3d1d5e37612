//! Cumulative request counters and pause-time accounting.
//!
//! The ledger is shared by every query task and by the control plane. All
//! access goes through one `RwLock`, so the three counters and the
//! per-domain map always move together.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dns::BlockSet;
use crate::error::PersistenceError;

/// Request count for one domain, as reported by [`StatsLedger::top_domains`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u64,
    /// Whether the domain is itself an entry of the block set.
    pub blocked: bool,
}

/// Point-in-time request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub total: u64,
    pub blocked: u64,
    pub allowed: u64,
}

/// Pause accounting derived from the ledger at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseStats {
    pub pause_count: u64,
    /// Accumulated pause time, including a session still in progress.
    pub total_pause_time: Duration,
    /// Uptime minus `total_pause_time`.
    pub total_blocking_time: Duration,
}

/// The persisted part of the ledger plus the in-progress pause marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerState {
    total_requests: u64,
    blocked_requests: u64,
    allowed_requests: u64,
    #[serde(default)]
    domain_counts: HashMap<String, u64>,
    start_time: DateTime<Utc>,
    #[serde(default)]
    pause_count: u64,
    #[serde(default)]
    total_pause_time: Duration,
    #[serde(skip)]
    pause_started: Option<Instant>,
}

impl LedgerState {
    fn fresh() -> Self {
        Self {
            total_requests: 0,
            blocked_requests: 0,
            allowed_requests: 0,
            domain_counts: HashMap::new(),
            start_time: Utc::now(),
            pause_count: 0,
            total_pause_time: Duration::ZERO,
            pause_started: None,
        }
    }

    fn current_pause(&self) -> Duration {
        self.pause_started
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    fn uptime(&self) -> Duration {
        (Utc::now() - self.start_time).to_std().unwrap_or_default()
    }
}

/// Thread-safe request statistics with snapshot persistence.
#[derive(Debug)]
pub struct StatsLedger {
    inner: RwLock<LedgerState>,
}

impl Default for StatsLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsLedger {
    /// Create a zero-valued ledger starting now.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::fresh()),
        }
    }

    /// Load a ledger from a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the file cannot be read or is not a
    /// valid snapshot.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let state: LedgerState =
            serde_json::from_slice(&data).map_err(|source| PersistenceError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            inner: RwLock::new(state),
        })
    }

    /// Load a ledger, starting fresh when the snapshot is missing or corrupt.
    pub fn load_or_fresh(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(ledger) => {
                info!(path = ?path, total = ledger.counts().total, "loaded stats snapshot");
                ledger
            }
            Err(err) => {
                warn!(path = ?path, error = %err, "failed to load stats, starting fresh");
                Self::new()
            }
        }
    }

    /// Write a snapshot of the ledger.
    ///
    /// The snapshot goes to a sibling temporary file first and is renamed
    /// over `path`, so readers never observe a partial file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let data = {
            let state = self.inner.read();
            serde_json::to_vec_pretty(&*state).map_err(|source| PersistenceError::Malformed {
                path: path.to_path_buf(),
                source,
            })?
        };

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PersistenceError::Io { path, source }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let tmp = temp_path(path);
        std::fs::write(&tmp, &data).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, path).map_err(io_err(path))?;

        debug!(path = ?path, bytes = data.len(), "saved stats snapshot");
        Ok(())
    }

    /// Count one classified query.
    pub fn record_request(&self, domain: &str, blocked: bool) {
        let mut state = self.inner.write();
        state.total_requests += 1;
        if blocked {
            state.blocked_requests += 1;
        } else {
            state.allowed_requests += 1;
        }
        *state.domain_counts.entry(domain.to_string()).or_default() += 1;
    }

    pub fn counts(&self) -> RequestCounts {
        let state = self.inner.read();
        RequestCounts {
            total: state.total_requests,
            blocked: state.blocked_requests,
            allowed: state.allowed_requests,
        }
    }

    /// The `n` most requested domains, highest count first.
    ///
    /// Ties are ordered arbitrarily.
    pub fn top_domains(&self, n: usize, block_set: &BlockSet) -> Vec<DomainCount> {
        let mut domains: Vec<(String, u64)> = {
            let state = self.inner.read();
            state
                .domain_counts
                .iter()
                .map(|(domain, count)| (domain.clone(), *count))
                .collect()
        };

        domains.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        domains.truncate(n);

        domains
            .into_iter()
            .map(|(domain, count)| DomainCount {
                blocked: block_set.contains(&domain),
                domain,
                count,
            })
            .collect()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.inner.read().start_time
    }

    pub fn uptime(&self) -> Duration {
        self.inner.read().uptime()
    }

    /// Open a pause session. Called by the pause controller only.
    pub(crate) fn start_pause(&self) {
        let mut state = self.inner.write();
        state.pause_count += 1;
        state.pause_started = Some(Instant::now());
    }

    /// Close the open pause session, if any, and accumulate its length.
    pub(crate) fn end_pause(&self) {
        let mut state = self.inner.write();
        if let Some(started) = state.pause_started.take() {
            state.total_pause_time += started.elapsed();
        }
    }

    pub fn pause_stats(&self) -> PauseStats {
        let state = self.inner.read();
        let total_pause_time = state.total_pause_time + state.current_pause();
        PauseStats {
            pause_count: state.pause_count,
            total_pause_time,
            total_blocking_time: state.uptime().saturating_sub(total_pause_time),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Periodically snapshot the ledger until `shutdown` fires.
///
/// Failures are logged and the next tick tries again.
pub fn spawn_snapshot_task(
    ledger: Arc<StatsLedger>,
    path: PathBuf,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let ledger = Arc::clone(&ledger);
            let path = path.clone();
            match tokio::task::spawn_blocking(move || ledger.save(path)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "failed to save stats"),
                Err(err) => warn!(error = %err, "stats snapshot task panicked"),
            }
        }
    })
}

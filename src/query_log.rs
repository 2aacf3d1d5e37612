//! Per-query JSON-lines log.
//!
//! Logging is a side channel: a sink that cannot be opened is replaced by a
//! disabled one, and write failures are dropped, so the DNS path never waits
//! on or fails because of the log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One logged query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub domain: String,
    pub blocked: bool,
    pub query_type: String,
}

/// Receives one record per classified query. Must never block for long or
/// report failure to the caller.
pub trait QueryLog: Send + Sync {
    fn record(&self, domain: &str, blocked: bool, query_type: &str);
}

/// Appends [`QueryLogEntry`] lines to a file.
#[derive(Debug)]
pub struct JsonLinesLog {
    file: Option<Mutex<File>>,
}

impl JsonLinesLog {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    /// Open `path`, falling back to a disabled sink on failure.
    pub fn open_or_disabled(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::open(path).unwrap_or_else(|err| {
            warn!(path = ?path, error = %err, "failed to open query log, query logging disabled");
            Self::disabled()
        })
    }

    /// A sink that discards every record.
    pub const fn disabled() -> Self {
        Self { file: None }
    }

    pub const fn is_enabled(&self) -> bool {
        self.file.is_some()
    }
}

impl QueryLog for JsonLinesLog {
    fn record(&self, domain: &str, blocked: bool, query_type: &str) {
        let Some(file) = &self.file else {
            return;
        };

        let entry = QueryLogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            domain: domain.to_string(),
            blocked,
            query_type: query_type.to_string(),
        };
        let Ok(mut line) = serde_json::to_vec(&entry) else {
            return;
        };
        line.push(b'\n');

        let mut file = file.lock();
        if let Err(err) = file.write_all(&line).and_then(|()| file.flush()) {
            debug!(error = %err, "dropped query log entry");
        }
    }
}

//! Error types for the focusguard daemon.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for focusguard operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("DNS protocol error: {0}")]
    Protocol(#[from] hickory_proto::error::ProtoError),

    #[error("resolver error: {0}")]
    Resolver(String),

    #[error("upstream {upstream} did not answer within {timeout_ms} ms")]
    UpstreamTimeout { upstream: String, timeout_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("control-plane error: {0}")]
    Control(#[from] ControlError),

    #[error("system DNS error: {0}")]
    SystemDns(String),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to write config file {path:?}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("upstream_timeout_ms must be greater than 0")]
    ZeroUpstreamTimeout,

    #[error("snapshot_interval_secs must be greater than 0")]
    ZeroSnapshotInterval,

    #[error("pause_minutes must be greater than 0")]
    ZeroPauseWindow,

    #[error("pause_minutes is {minutes}, at most {max} is allowed")]
    PauseWindowTooLong { minutes: u64, max: u64 },

    #[error("blocked site cannot be empty")]
    EmptyBlockedSite,

    #[error("blocked site {site:?} must not contain wildcards")]
    WildcardBlockedSite { site: String },

    #[error("socket_path cannot be empty")]
    EmptySocketPath,
}

/// Errors loading or saving the stats snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed snapshot {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Control-plane transport and protocol errors.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("deadline of {0:?} expired")]
    Deadline(std::time::Duration),

    #[error("connection closed before a complete message was received")]
    UnexpectedEof,

    #[error("message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("daemon replied with an error: {0}")]
    Remote(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

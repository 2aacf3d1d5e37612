//! Configuration loading and validation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result, ValidationError};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/focusguard/config.toml";

/// Longest accepted pause window, in minutes.
pub const MAX_PAUSE_MINUTES: u64 = 24 * 60;

/// Control socket used when the config does not name one.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/focusguard.sock";

/// Main configuration for the focusguard daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Domains to refuse, together with all their subdomains.
    /// Entries are plain names ("example.com"); a trailing dot is optional.
    #[serde(default = "default_blocked_sites")]
    pub blocked_sites: Vec<String>,

    /// File receiving one JSON line per classified query.
    #[serde(default = "default_log_file_path")]
    pub log_file_path: PathBuf,

    /// Address the DNS service binds to.
    #[serde(
        default = "default_listen",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub listen: SocketAddr,

    /// Upstream DNS resolver address (e.g., "8.8.8.8:53").
    #[serde(
        default = "default_upstream_resolver",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub upstream_resolver: SocketAddr,

    /// Upper bound on one upstream round trip, in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// Control-plane Unix socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Stats snapshot file.
    #[serde(default = "default_stats_path")]
    pub stats_path: PathBuf,

    /// Seconds between two stats snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Length of a pause session, in minutes.
    #[serde(default = "default_pause_minutes")]
    pub pause_minutes: u64,

    /// Point the operating system's resolver at this daemon while it runs.
    #[serde(default)]
    pub redirect_system_dns: bool,

    /// Network service whose DNS servers get redirected.
    #[serde(default = "default_network_service")]
    pub network_service: String,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(
        default = "default_metrics_listen",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocked_sites: default_blocked_sites(),
            log_file_path: default_log_file_path(),
            listen: default_listen(),
            upstream_resolver: default_upstream_resolver(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            socket_path: default_socket_path(),
            stats_path: default_stats_path(),
            snapshot_interval_secs: default_snapshot_interval(),
            pause_minutes: default_pause_minutes(),
            redirect_system_dns: false,
            network_service: default_network_service(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_blocked_sites() -> Vec<String> {
    vec!["example.com".to_string()]
}

fn default_log_file_path() -> PathBuf {
    PathBuf::from("/var/log/focusguard/dns_requests.json")
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_upstream_resolver() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], 53))
}

const fn default_upstream_timeout_ms() -> u64 {
    2000
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_stats_path() -> PathBuf {
    PathBuf::from("/var/lib/focusguard/stats.json")
}

const fn default_snapshot_interval() -> u64 {
    300
}

const fn default_pause_minutes() -> u64 {
    10
}

fn default_network_service() -> String {
    "Wi-Fi".to_string()
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Load configuration, substituting and persisting the default when the
    /// file is missing or invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = ?path, error = %err, "failed to load config, using defaults");
                let config = Self::default();
                if let Err(err) = config.save(path) {
                    tracing::warn!(path = ?path, error = %err, "failed to save default config");
                }
                config
            }
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        let write_err = |source| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    /// Upstream round-trip bound.
    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Interval between two stats snapshots.
    pub const fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    /// Length of one pause session.
    pub const fn pause_window(&self) -> Duration {
        Duration::from_secs(self.pause_minutes.saturating_mul(60))
    }

    fn validate(&self) -> Result<()> {
        if self.upstream_timeout_ms == 0 {
            return Err(ConfigError::from(ValidationError::ZeroUpstreamTimeout).into());
        }

        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::from(ValidationError::ZeroSnapshotInterval).into());
        }

        if self.pause_minutes == 0 {
            return Err(ConfigError::from(ValidationError::ZeroPauseWindow).into());
        }

        if self.pause_minutes > MAX_PAUSE_MINUTES {
            return Err(ConfigError::from(ValidationError::PauseWindowTooLong {
                minutes: self.pause_minutes,
                max: MAX_PAUSE_MINUTES,
            })
            .into());
        }

        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::from(ValidationError::EmptySocketPath).into());
        }

        for site in &self.blocked_sites {
            let trimmed = site.trim().trim_end_matches('.');
            if trimmed.is_empty() {
                return Err(ConfigError::from(ValidationError::EmptyBlockedSite).into());
            }
            if trimmed.contains('*') {
                return Err(ConfigError::from(ValidationError::WildcardBlockedSite {
                    site: site.clone(),
                })
                .into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
            blocked_sites = ["linkedin.com", "news.ycombinator.com."]
            upstream_resolver = "1.1.1.1:53"
            upstream_timeout_ms = 1500
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.upstream_resolver.to_string(), "1.1.1.1:53");
        assert_eq!(config.upstream_timeout(), Duration::from_millis(1500));
        assert_eq!(config.blocked_sites.len(), 2);
    }

    #[test]
    fn test_default_values() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.blocked_sites, vec!["example.com"]);
        assert_eq!(config.listen.port(), 53);
        assert_eq!(config.upstream_resolver.to_string(), "8.8.8.8:53");
        assert_eq!(config.pause_window(), Duration::from_secs(600));
        assert_eq!(config.snapshot_interval(), Duration::from_secs(300));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/focusguard.sock"));
        assert!(!config.redirect_system_dns);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_invalid_resolver_address() {
        let toml = r#"
            upstream_resolver = "not-an-address"
        "#;

        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Config::parse("upstream_timeout_ms = 0").is_err());
        assert!(Config::parse("snapshot_interval_secs = 0").is_err());
        assert!(Config::parse("pause_minutes = 0").is_err());
    }

    #[test]
    fn test_oversized_pause_window_rejected() {
        assert!(Config::parse("pause_minutes = 400000000000000000").is_err());
        assert!(Config::parse("pause_minutes = 1441").is_err());

        let config = Config::parse("pause_minutes = 1440").unwrap();
        assert_eq!(config.pause_window(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_empty_or_wildcard_site_rejected() {
        assert!(Config::parse(r#"blocked_sites = ["a.com", ""]"#).is_err());
        assert!(Config::parse(r#"blocked_sites = ["."]"#).is_err());
        assert!(Config::parse(r#"blocked_sites = ["*.ads.com"]"#).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::parse(r#"unknown_field = "value""#).is_err());
    }

    #[test]
    fn test_metrics_section() {
        let toml = r#"
            [metrics]
            enabled = true
            listen = "0.0.0.0:9100"
        "#;

        let config = Config::parse(toml).unwrap();
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen.port(), 9100);
    }

    #[test]
    fn test_missing_file_persists_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_or_default(&path);
        assert_eq!(config.blocked_sites, vec!["example.com"]);
        assert!(path.exists());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.blocked_sites, config.blocked_sites);
        assert_eq!(reloaded.upstream_resolver, config.upstream_resolver);
    }

    #[test]
    fn test_corrupt_file_replaced_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "blocked_sites = [").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.pause_minutes, 10);
        assert!(Config::load(&path).is_ok());
    }
}

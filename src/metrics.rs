//! Metrics initialization for Prometheus exporter.
//!
//! Counters are recorded unconditionally; without an installed recorder the
//! `metrics` macros are no-ops.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

const QUERIES_TOTAL: &str = "focusguard_queries_total";
const UPSTREAM_ERRORS_TOTAL: &str = "focusguard_upstream_errors_total";
const PAUSES_TOTAL: &str = "focusguard_pauses_total";

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|err| Error::Metrics(err.to_string()))?;

    Ok(())
}

pub(crate) fn record_verdict(blocked: bool) {
    let verdict = if blocked { "blocked" } else { "allowed" };
    ::metrics::counter!(QUERIES_TOTAL, "verdict" => verdict).increment(1);
}

pub(crate) fn record_upstream_error() {
    ::metrics::counter!(UPSTREAM_ERRORS_TOTAL).increment(1);
}

pub(crate) fn record_pause() {
    ::metrics::counter!(PAUSES_TOTAL).increment(1);
}

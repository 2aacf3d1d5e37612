//! Focusguard daemon - entry point.
//!
//! Serves DNS on UDP, refusing blocked domains and forwarding the rest, and
//! exposes the control socket used by `focusguard-ctl`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use focusguard::config::{Config, DEFAULT_CONFIG_PATH};
use focusguard::control::ControlPlane;
use focusguard::control::server::{self as control_server, DEFAULT_IO_DEADLINE};
use focusguard::dns::{BlockSet, Classifier, UpstreamResolver};
use focusguard::pause::PauseController;
use focusguard::query_log::JsonLinesLog;
use focusguard::server::{QueryHandler, run_server};
use focusguard::stats::{ActivityRing, StatsLedger, activity, ledger};
use focusguard::system_dns::{DnsRedirect, NetworkSetup, NoRedirect};

/// Wait for Ctrl-C or SIGTERM.
async fn wait_for_signal() -> Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down...");
        }
        _ = terminate.recv() => info!("SIGTERM received, shutting down..."),
    }
    Ok(())
}

/// Bind the sockets, run every task, and stop them on a signal.
async fn serve(
    config: &Config,
    ledger: Arc<StatsLedger>,
    activity: Arc<ActivityRing>,
    pause: Arc<PauseController>,
    block_set: Arc<BlockSet>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener =
        control_server::bind(&config.socket_path).context("Failed to bind control socket")?;
    info!("Control socket: {}", config.socket_path.display());

    let socket = UdpSocket::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind DNS socket on {}", config.listen))?;
    info!("Listening for DNS on {}", config.listen);

    let ticker = activity::spawn_ticker(
        Arc::clone(&activity),
        Duration::from_secs(1),
        shutdown_rx.clone(),
    );
    let snapshots = ledger::spawn_snapshot_task(
        Arc::clone(&ledger),
        config.stats_path.clone(),
        config.snapshot_interval(),
        shutdown_rx.clone(),
    );

    let plane = Arc::new(ControlPlane::new(
        Arc::clone(&ledger),
        Arc::clone(&pause),
        Arc::clone(&activity),
        Arc::clone(&block_set),
    ));
    let control = tokio::spawn(control_server::serve(
        listener,
        plane,
        DEFAULT_IO_DEADLINE,
        shutdown_rx.clone(),
    ));

    let query_log = Arc::new(JsonLinesLog::open_or_disabled(&config.log_file_path));
    let classifier = Classifier::new(block_set, pause, Arc::clone(&ledger), activity)
        .with_query_log(query_log);
    let resolver =
        UpstreamResolver::with_timeout(config.upstream_resolver, config.upstream_timeout());
    let handler = QueryHandler::new(classifier, resolver);
    let mut server = tokio::spawn(run_server(Arc::new(socket), handler, shutdown_rx));

    let outcome = tokio::select! {
        result = wait_for_signal() => result,
        result = &mut server => {
            error!("DNS server stopped unexpectedly");
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err).context("DNS server failed"),
                Err(err) => Err(err).context("DNS server task failed"),
            }
        }
    };

    let _ = shutdown_tx.send(true);
    for (name, handle) in [("ticker", ticker), ("snapshot", snapshots), ("control", control)] {
        if let Err(err) = handle.await {
            warn!("{name} task failed: {err}");
        }
    }
    if !server.is_finished() {
        let _ = server.await;
    }

    outcome
}

async fn run() -> Result<()> {
    let config_path = std::env::var_os("FOCUSGUARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load_or_default(&config_path);

    // Initialize metrics (must be done early, before any metrics are recorded)
    focusguard::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting Focusguard...");
    info!("Upstream resolver: {}", config.upstream_resolver);

    let block_set = Arc::new(BlockSet::new(&config.blocked_sites));
    info!("Blocked sites: {}", block_set.len());

    let ledger = Arc::new(StatsLedger::load_or_fresh(&config.stats_path));
    let activity = Arc::new(ActivityRing::new());
    let pause = Arc::new(PauseController::with_window(
        Arc::clone(&ledger),
        config.pause_window(),
    ));

    let redirect: Box<dyn DnsRedirect> = if config.redirect_system_dns {
        Box::new(NetworkSetup::new(config.network_service.clone()))
    } else {
        Box::new(NoRedirect)
    };
    let restore = redirect.redirect().context("Failed to redirect system DNS")?;

    let outcome = serve(&config, Arc::clone(&ledger), activity, pause, block_set).await;

    if let Err(err) = ledger.save(&config.stats_path) {
        warn!("Failed to save final stats snapshot: {err}");
    }
    if let Err(err) = redirect.restore(&restore) {
        warn!("Failed to restore system DNS: {err}");
    }
    if let Err(err) = control_server::remove_socket(&config.socket_path) {
        warn!("Failed to remove control socket: {err}");
    }

    info!("Shutdown complete.");
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    run().await
}

//! Control-plane server on a local Unix socket.
//!
//! Each connection carries one request and one response, then closes.
//! Reads and writes run under a deadline so a slow or silent client only
//! ever costs its own task.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::protocol::{self, Request, Response, format_hms, format_timestamp};
use crate::dns::BlockSet;
use crate::error::ControlError;
use crate::pause::PauseController;
use crate::stats::{ActivityRing, StatsLedger};

/// Deadline applied to the read and to the write of one connection.
pub const DEFAULT_IO_DEADLINE: Duration = Duration::from_secs(5);

/// Number of domains reported by `get_stats`.
pub const TOP_DOMAINS: usize = 10;

/// The state the control plane reads and, for `pause`, mutates.
pub struct ControlPlane {
    ledger: Arc<StatsLedger>,
    pause: Arc<PauseController>,
    activity: Arc<ActivityRing>,
    block_set: Arc<BlockSet>,
}

impl ControlPlane {
    pub fn new(
        ledger: Arc<StatsLedger>,
        pause: Arc<PauseController>,
        activity: Arc<ActivityRing>,
        block_set: Arc<BlockSet>,
    ) -> Self {
        Self {
            ledger,
            pause,
            activity,
            block_set,
        }
    }

    /// Answer one request.
    pub fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::pong(),
            Request::GetStats => self.stats(),
            Request::Pause => Response::paused(self.pause.pause()),
            Request::Unknown => Response::error("unknown request type"),
        }
    }

    fn stats(&self) -> Response {
        // Resolve pause expiry before reading the ledger's pause accounting.
        let status = self.pause.status();
        let counts = self.ledger.counts();
        let pause_stats = self.ledger.pause_stats();

        Response {
            total_requests: Some(counts.total),
            blocked_requests: Some(counts.blocked),
            allowed_requests: Some(counts.allowed),
            top_domains: Some(self.ledger.top_domains(TOP_DOMAINS, &self.block_set)),
            uptime: Some(format_hms(self.ledger.uptime())),
            is_paused: Some(status.is_paused()),
            pause_ends_at: status.until().map(format_timestamp),
            pause_count: Some(pause_stats.pause_count),
            total_pause_time: Some(format_hms(pause_stats.total_pause_time)),
            total_blocking_time: Some(format_hms(pause_stats.total_blocking_time)),
            recent_activity: Some(self.activity.snapshot()),
            ..Response::stats()
        }
    }
}

/// Bind the control socket at `path`.
///
/// A stale socket file is removed first, and the new one is made
/// world-read/writable so unprivileged clients can reach a root daemon.
pub fn bind(path: impl AsRef<Path>) -> io::Result<UnixListener> {
    let path = path.as_ref();
    if remove_socket(path)? {
        debug!(path = ?path, "removed stale control socket");
    }

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
    Ok(listener)
}

/// Remove the socket file at `path`; returns whether one was there.
pub fn remove_socket(path: impl AsRef<Path>) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Accept connections until `shutdown` fires.
///
/// Accept errors are logged and the loop keeps going.
pub async fn serve(
    listener: UnixListener,
    plane: Arc<ControlPlane>,
    deadline: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(err) => {
                    warn!(error = %err, "failed to accept control connection");
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };

        let plane = Arc::clone(&plane);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &plane, deadline).await {
                debug!(error = %err, "control connection closed with error");
            }
        });
    }

    info!("control server stopped");
}

/// Serve one connection: read a request, write a response, close.
pub async fn handle_connection<S>(
    mut stream: S,
    plane: &ControlPlane,
    deadline: Duration,
) -> Result<(), ControlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = tokio::time::timeout(deadline, protocol::read_message::<Request, _>(&mut stream))
        .await
        .map_err(|_| ControlError::Deadline(deadline))?;

    let response = match request {
        Ok(request) => {
            debug!(?request, "control request");
            plane.dispatch(request)
        }
        Err(ControlError::Io(err)) => return Err(ControlError::Io(err)),
        Err(err) => {
            debug!(error = %err, "invalid control request");
            Response::error("invalid request")
        }
    };

    tokio::time::timeout(deadline, protocol::write_message(&mut stream, &response))
        .await
        .map_err(|_| ControlError::Deadline(deadline))??;
    stream.shutdown().await?;
    Ok(())
}

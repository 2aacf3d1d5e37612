//! Client side of the control socket, used by `focusguard-ctl`.

use std::path::Path;
use std::time::Duration;

use tokio::net::UnixStream;

use super::protocol::{self, Request, Response};
use crate::error::ControlError;

/// Bound on connecting, and separately on the full exchange.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Send one request and wait for the daemon's answer.
///
/// An `error` response is returned as [`ControlError::Remote`].
pub async fn send_request(
    path: impl AsRef<Path>,
    request: Request,
) -> Result<Response, ControlError> {
    send_request_with_timeout(path, request, CLIENT_TIMEOUT).await
}

pub async fn send_request_with_timeout(
    path: impl AsRef<Path>,
    request: Request,
    timeout: Duration,
) -> Result<Response, ControlError> {
    let mut stream = tokio::time::timeout(timeout, UnixStream::connect(path.as_ref()))
        .await
        .map_err(|_| ControlError::Deadline(timeout))??;

    let response = tokio::time::timeout(timeout, async {
        protocol::write_message(&mut stream, &request).await?;
        protocol::read_message::<Response, _>(&mut stream).await
    })
    .await
    .map_err(|_| ControlError::Deadline(timeout))??;

    response.into_result()
}

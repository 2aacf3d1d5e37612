//! Control-plane wire format.
//!
//! One JSON value travels in each direction per connection. Values are
//! self-delimiting, so the reader stops as soon as it holds a complete
//! value; writers append a newline for the benefit of line-based tools.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ControlError;
use crate::stats::DomainCount;

/// Upper bound on one encoded message.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Client request, tagged by `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    GetStats,
    Pause,
    /// Any `type` this daemon does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Stats,
    Pong,
    Paused,
    Error,
}

/// Daemon response. Only the fields relevant to `kind` are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_requests: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_requests: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_requests: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_domains: Option<Vec<DomainCount>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_ends_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pause_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_blocking_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_activity: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn empty(kind: ResponseKind) -> Self {
        Self {
            kind,
            total_requests: None,
            blocked_requests: None,
            allowed_requests: None,
            top_domains: None,
            uptime: None,
            is_paused: None,
            pause_ends_at: None,
            pause_count: None,
            total_pause_time: None,
            total_blocking_time: None,
            recent_activity: None,
            error: None,
        }
    }

    pub fn pong() -> Self {
        Self::empty(ResponseKind::Pong)
    }

    pub fn paused(until: DateTime<Utc>) -> Self {
        Self {
            pause_ends_at: Some(format_timestamp(until)),
            ..Self::empty(ResponseKind::Paused)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(ResponseKind::Error)
        }
    }

    pub(crate) fn stats() -> Self {
        Self::empty(ResponseKind::Stats)
    }

    /// Turn an `error` response into [`ControlError::Remote`].
    pub fn into_result(self) -> Result<Self, ControlError> {
        match self.kind {
            ResponseKind::Error => Err(ControlError::Remote(
                self.error.unwrap_or_else(|| "unspecified error".to_string()),
            )),
            _ => Ok(self),
        }
    }

    /// Parse `pause_ends_at`, if present.
    pub fn pause_ends_at(&self) -> Option<DateTime<Utc>> {
        self.pause_ends_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
    }
}

/// RFC 3339 with second precision, UTC.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `HH:MM:SS`; hours keep growing past 99.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Read exactly one JSON value.
///
/// Bytes following the value are ignored.
pub async fn read_message<T, R>(reader: &mut R) -> Result<T, ControlError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 1024];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.iter().all(u8::is_ascii_whitespace) {
                return Err(ControlError::UnexpectedEof);
            }
            return serde_json::from_slice(&buf).map_err(ControlError::Malformed);
        }
        buf.extend_from_slice(&chunk[..n]);

        match serde_json::Deserializer::from_slice(&buf)
            .into_iter::<T>()
            .next()
        {
            Some(Ok(value)) => return Ok(value),
            Some(Err(err)) if err.is_eof() => {}
            Some(Err(err)) => return Err(ControlError::Malformed(err)),
            None => {}
        }

        if buf.len() > MAX_MESSAGE_BYTES {
            return Err(ControlError::TooLarge(MAX_MESSAGE_BYTES));
        }
    }
}

/// Write one JSON value followed by a newline.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), ControlError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut data = serde_json::to_vec(message).map_err(ControlError::Malformed)?;
    data.push(b'\n');
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

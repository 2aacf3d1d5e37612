//! DNS resolver trait and the upstream forwarder.
//!
//! Provides abstraction over DNS resolution to enable:
//! - Testing with mock resolvers
//! - Swapping the transport without touching the query handler

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// Receive buffer for upstream replies; large enough for EDNS payloads.
pub const MAX_UDP_DNS_SIZE: usize = 4096;

/// Default bound on one upstream round trip.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Trait for DNS resolution.
pub trait DnsResolver: Send + Sync + Clone + 'static {
    /// Resolve a DNS query and return the response.
    fn resolve(&self, query: &Message) -> impl Future<Output = Result<Message>> + Send;
}

/// Upstream DNS resolver using UDP.
///
/// Relays the query unchanged to a single upstream server. No caching,
/// retries or failover; the whole exchange is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct UpstreamResolver {
    upstream_addr: SocketAddr,
    timeout: Duration,
}

impl UpstreamResolver {
    /// Create a new upstream resolver.
    pub const fn new(upstream_addr: SocketAddr) -> Self {
        Self::with_timeout(upstream_addr, DEFAULT_UPSTREAM_TIMEOUT)
    }

    pub const fn with_timeout(upstream_addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            upstream_addr,
            timeout,
        }
    }

    async fn exchange(&self, query_bytes: &[u8]) -> Result<Message> {
        let bind_addr: SocketAddr = if self.upstream_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.upstream_addr).await?;
        socket.send(query_bytes).await?;

        let mut response_buf = [0u8; MAX_UDP_DNS_SIZE];
        let len = socket.recv(&mut response_buf).await?;

        let response = Message::from_bytes(&response_buf[..len])?;
        Ok(response)
    }
}

impl DnsResolver for UpstreamResolver {
    async fn resolve(&self, query: &Message) -> Result<Message> {
        let query_bytes = query.to_bytes()?;

        tokio::time::timeout(self.timeout, self.exchange(&query_bytes))
            .await
            .map_err(|_| Error::UpstreamTimeout {
                upstream: self.upstream_addr.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

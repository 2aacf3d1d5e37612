//! DNS server orchestration.
//!
//! Receives datagrams, classifies each question, answers blocked queries
//! with `REFUSED` and relays the rest to the upstream resolver. Designed
//! with trait-based dependencies for testability.

use std::sync::Arc;

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::dns::resolver::MAX_UDP_DNS_SIZE;
use crate::dns::{Classifier, DnsResolver, reply};
use crate::error::Result;

/// DNS query handler that processes queries using the provided dependencies.
///
/// This struct encapsulates the per-query pipeline, separated from the
/// socket loop for easier testing.
pub struct QueryHandler<R>
where
    R: DnsResolver,
{
    classifier: Arc<Classifier>,
    resolver: R,
}

impl<R> QueryHandler<R>
where
    R: DnsResolver,
{
    /// Create a new query handler.
    pub fn new(classifier: Classifier, resolver: R) -> Self {
        Self::with_shared_classifier(Arc::new(classifier), resolver)
    }

    pub fn with_shared_classifier(classifier: Arc<Classifier>, resolver: R) -> Self {
        Self {
            classifier,
            resolver,
        }
    }

    /// Handle a DNS query and return the response.
    ///
    /// Every question is classified and counted. If any of them is blocked
    /// the whole message is refused without contacting the upstream;
    /// otherwise the message is forwarded once. Upstream failures produce
    /// an empty reply, so this never fails.
    #[instrument(skip(self, query), fields(id = query.id()))]
    pub async fn handle_query(&self, query: Message) -> Message {
        if query.queries().is_empty() {
            warn!("Query has no questions");
            return reply::reply_to(&query);
        }

        let mut blocked = false;
        for question in query.queries() {
            let name = question.name().to_ascii();
            let classification = self
                .classifier
                .classify(&name, &question.query_type().to_string());
            blocked |= classification.is_blocked();
        }

        if blocked {
            info!("Refusing blocked query");
            return reply::refused(&query);
        }

        match self.resolver.resolve(&query).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "upstream exchange failed, sending empty reply");
                crate::metrics::record_upstream_error();
                reply::reply_to(&query)
            }
        }
    }
}

impl<R> Clone for QueryHandler<R>
where
    R: DnsResolver,
{
    fn clone(&self) -> Self {
        Self {
            classifier: Arc::clone(&self.classifier),
            resolver: self.resolver.clone(),
        }
    }
}

/// Process a single DNS datagram and return the encoded reply.
pub async fn process_datagram<R>(payload: &[u8], handler: &QueryHandler<R>) -> Result<Vec<u8>>
where
    R: DnsResolver,
{
    let query = Message::from_bytes(payload)?;
    let response = handler.handle_query(query).await;
    Ok(response.to_bytes()?)
}

/// Run the DNS server loop until `shutdown` fires.
///
/// Each datagram is handled in its own task; in-flight tasks finish on their
/// own once the loop stops.
pub async fn run_server<R>(
    socket: Arc<UdpSocket>,
    handler: QueryHandler<R>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: DnsResolver,
{
    let mut buf = [0u8; MAX_UDP_DNS_SIZE];

    loop {
        let (len, peer) = tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = %err, "failed to receive datagram");
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };

        let payload = buf[..len].to_vec();
        let socket = Arc::clone(&socket);
        let handler = handler.clone();
        tokio::spawn(async move {
            let response = match process_datagram(&payload, &handler).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(peer = %peer, error = %err, "dropping malformed datagram");
                    return;
                }
            };
            if let Err(err) = socket.send_to(&response, peer).await {
                warn!(peer = %peer, error = %err, "failed to send response");
            }
        });
    }

    info!("DNS server stopped");
    Ok(())
}

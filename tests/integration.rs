//! End-to-end tests for the daemon.
//!
//! These run the real UDP server against a fake upstream resolver and drive
//! the real control socket, the same way `focusguard-ctl` does.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use focusguard::control::server::{self as control_server, DEFAULT_IO_DEADLINE};
use focusguard::control::{ControlPlane, Request, Response, ResponseKind, send_request};
use focusguard::dns::{BlockSet, Classifier, UpstreamResolver};
use focusguard::pause::PauseController;
use focusguard::query_log::{JsonLinesLog, QueryLogEntry};
use focusguard::server::{QueryHandler, run_server};
use focusguard::stats::{ActivityRing, StatsLedger};
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const UPSTREAM_ANSWER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);

/// Fake upstream that answers every A query with [`UPSTREAM_ANSWER`].
async fn spawn_upstream() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            let query = Message::from_bytes(&buf[..len]).unwrap();
            let mut response = focusguard::dns::reply::reply_to(&query);
            for question in query.queries() {
                response.add_answer(Record::from_rdata(
                    question.name().clone(),
                    300,
                    RData::A(A(UPSTREAM_ANSWER)),
                ));
            }
            socket
                .send_to(&response.to_bytes().unwrap(), peer)
                .await
                .unwrap();
        }
    });
    addr
}

struct Daemon {
    _dir: TempDir,
    dns_addr: SocketAddr,
    socket_path: PathBuf,
    log_path: PathBuf,
    ledger: Arc<StatsLedger>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    async fn start(sites: &[&str], upstream: SocketAddr) -> Self {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("focusguard.sock");
        let log_path = dir.path().join("queries.json");

        let block_set = Arc::new(BlockSet::new(sites));
        let ledger = Arc::new(StatsLedger::new());
        let activity = Arc::new(ActivityRing::new());
        let pause = Arc::new(PauseController::new(Arc::clone(&ledger)));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let plane = Arc::new(ControlPlane::new(
            Arc::clone(&ledger),
            Arc::clone(&pause),
            Arc::clone(&activity),
            Arc::clone(&block_set),
        ));
        let listener = control_server::bind(&socket_path).unwrap();
        let control = tokio::spawn(control_server::serve(
            listener,
            plane,
            DEFAULT_IO_DEADLINE,
            shutdown_rx.clone(),
        ));

        let classifier = Classifier::new(block_set, pause, Arc::clone(&ledger), activity)
            .with_query_log(Arc::new(JsonLinesLog::open(&log_path).unwrap()));
        let resolver = UpstreamResolver::with_timeout(upstream, Duration::from_secs(2));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dns_addr = socket.local_addr().unwrap();
        let server = tokio::spawn(async move {
            run_server(
                Arc::new(socket),
                QueryHandler::new(classifier, resolver),
                shutdown_rx,
            )
            .await
            .unwrap();
        });

        Self {
            _dir: dir,
            dns_addr,
            socket_path,
            log_path,
            ledger,
            shutdown,
            tasks: vec![control, server],
        }
    }

    async fn query(&self, domain: &str, id: u16) -> Message {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_str(domain).unwrap(), RecordType::A));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&message.to_bytes().unwrap(), self.dns_addr)
            .await
            .unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(3), client.recv_from(&mut buf))
            .await
            .expect("no DNS reply")
            .unwrap();
        Message::from_bytes(&buf[..len]).unwrap()
    }

    async fn control(&self, request: Request) -> Response {
        send_request(&self.socket_path, request).await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

fn answer_ip(response: &Message) -> Option<Ipv4Addr> {
    response.answers().iter().find_map(|record| match record.data() {
        Some(RData::A(A(ip))) => Some(*ip),
        _ => None,
    })
}

fn read_log(path: &Path) -> Vec<QueryLogEntry> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_block_forward_and_pause_flow() {
    let upstream = spawn_upstream().await;
    let daemon = Daemon::start(&["social.example."], upstream).await;

    let response = daemon.query("social.example.", 1).await;
    assert_eq!(response.id(), 1);
    assert_eq!(response.response_code(), ResponseCode::Refused);
    assert!(response.answers().is_empty());

    let response = daemon.query("feed.social.example.", 2).await;
    assert_eq!(response.response_code(), ResponseCode::Refused);

    let response = daemon.query("other.example.", 3).await;
    assert_eq!(response.id(), 3);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(answer_ip(&response), Some(UPSTREAM_ANSWER));

    let stats = daemon.control(Request::GetStats).await;
    assert_eq!(stats.kind, ResponseKind::Stats);
    assert_eq!(stats.total_requests, Some(3));
    assert_eq!(stats.blocked_requests, Some(2));
    assert_eq!(stats.allowed_requests, Some(1));
    assert_eq!(stats.is_paused, Some(false));
    assert_eq!(
        stats.recent_activity.as_ref().map(|slots| slots.iter().sum::<u64>()),
        Some(3)
    );
    let top = stats.top_domains.unwrap();
    let social = top.iter().find(|d| d.domain == "social.example").unwrap();
    assert!(social.blocked);
    let feed = top.iter().find(|d| d.domain == "feed.social.example").unwrap();
    assert!(!feed.blocked);

    let paused = daemon.control(Request::Pause).await;
    assert_eq!(paused.kind, ResponseKind::Paused);
    let until = paused.pause_ends_at().unwrap();
    let window = until - chrono::Utc::now();
    assert!(window > chrono::Duration::minutes(9));
    assert!(window <= chrono::Duration::minutes(10));

    let response = daemon.query("social.example.", 4).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(answer_ip(&response), Some(UPSTREAM_ANSWER));

    let stats = daemon.control(Request::GetStats).await;
    assert_eq!(stats.is_paused, Some(true));
    assert_eq!(stats.pause_ends_at, paused.pause_ends_at);
    assert_eq!(stats.pause_count, Some(1));
    assert_eq!(stats.total_requests, Some(4));
    assert_eq!(stats.allowed_requests, Some(2));

    let entries = read_log(&daemon.log_path);
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].domain, "social.example");
    assert!(entries[0].blocked);
    assert_eq!(entries[0].query_type, "A");
    assert!(!entries[3].blocked);

    assert_eq!(daemon.ledger.counts().total, 4);
    daemon.stop().await;
}

#[tokio::test]
async fn test_control_socket_answers_ping_and_rejects_unknown() {
    let upstream = spawn_upstream().await;
    let daemon = Daemon::start(&[], upstream).await;

    let pong = daemon.control(Request::Ping).await;
    assert_eq!(pong.kind, ResponseKind::Pong);

    let result = send_request(&daemon.socket_path, Request::Unknown).await;
    assert!(matches!(
        result,
        Err(focusguard::error::ControlError::Remote(message)) if message == "unknown request type"
    ));

    daemon.stop().await;
}

#[tokio::test]
async fn test_upstream_failure_yields_empty_reply() {
    // Nothing listens here; the exchange times out.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let upstream = silent.local_addr().unwrap();
    let daemon = Daemon::start(&[], upstream).await;

    let response = daemon.query("other.example.", 9).await;

    assert_eq!(response.id(), 9);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.answers().is_empty());
    assert_eq!(response.queries().len(), 1);

    daemon.stop().await;
}

#[tokio::test]
async fn test_stats_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stats.json");

    let ledger = StatsLedger::new();
    ledger.record_request("social.example", true);
    ledger.record_request("other.example", false);
    ledger.save(&path).unwrap();

    let restored = StatsLedger::load_or_fresh(&path);
    let counts = restored.counts();
    assert_eq!((counts.total, counts.blocked, counts.allowed), (2, 1, 1));
    assert_eq!(restored.start_time(), ledger.start_time());
}

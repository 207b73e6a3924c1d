//! End-to-end relay tests: a real listener on an ephemeral port and raw TCP clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

use chat_relay::{CliOverrides, RelayConfig, RelayError, Server, SharedState};

/// Timeout for each async operation in tests.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a client must stay quiet to count as "received nothing".
const QUIET_PERIOD: Duration = Duration::from_millis(200);

const HEADER_TEXT: &str = "Последние сообщения чата:";

struct TestRelay {
    addr: SocketAddr,
    state: SharedState,
    cancel: CancellationToken,
    handle: JoinHandle<chat_relay::Result<()>>,
}

async fn start_relay() -> TestRelay {
    let config = RelayConfig::default().with_overrides(&CliOverrides {
        host: Some("127.0.0.1".into()),
        port: Some(0),
    });
    let server = Server::bind(&config).await.expect("failed to bind relay");
    let addr = server.local_addr().unwrap();
    let state = server.state();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.run(cancel.clone()));
    TestRelay {
        addr,
        state,
        cancel,
        handle,
    }
}

struct Client {
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(TEST_TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect failed");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: FramedRead::new(read_half, LinesCodec::new()),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write failed");
    }

    /// Next line from the server, or `None` once the connection is closed.
    async fn recv(&mut self) -> Option<String> {
        match timeout(TEST_TIMEOUT, self.lines.next())
            .await
            .expect("timed out waiting for server line")
        {
            Some(Ok(line)) => Some(line),
            Some(Err(_)) | None => None,
        }
    }

    async fn expect_line(&mut self) -> String {
        self.recv().await.expect("connection closed unexpectedly")
    }

    async fn expect_quiet(&mut self) {
        if let Ok(Some(item)) = timeout(QUIET_PERIOD, self.lines.next()).await {
            panic!("expected no data, got {:?}", item);
        }
    }

    /// Connect and authenticate, consuming the greeting.
    async fn logged_in(addr: SocketAddr, login: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("login:{login}")).await;
        assert_eq!(client.expect_line().await, format!("Привет, {login}"));
        client
    }

    /// Consume the history header plus `count` replayed records.
    async fn expect_replay(&mut self, count: usize) -> Vec<String> {
        assert_eq!(self.expect_line().await, "");
        assert_eq!(self.expect_line().await, HEADER_TEXT);
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(self.expect_line().await);
        }
        records
    }
}

/// `[HH:MM:SS] <login>: body`
fn assert_record(line: &str, login: &str, body: &str) {
    let suffix = format!("] <{login}>: {body}");
    assert!(line.ends_with(&suffix), "unexpected record {line:?}");
    let stamp = &line[..line.len() - suffix.len()];
    assert_eq!(stamp.len(), 9, "bad timestamp in {line:?}");
    assert!(stamp.starts_with('['));
    let time = &stamp[1..];
    assert_eq!(time.as_bytes()[2], b':');
    assert_eq!(time.as_bytes()[5], b':');
    assert!(
        time.chars().filter(|c| *c != ':').all(|c| c.is_ascii_digit()),
        "bad timestamp in {line:?}"
    );
}

async fn wait_for_roster_len(state: &SharedState, expected: usize) {
    timeout(TEST_TIMEOUT, async {
        loop {
            if state.lock().await.roster.len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("roster never reached {expected} members"));
}

// ── scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_greets_without_history_header() {
    let relay = start_relay().await;

    let mut alice = Client::logged_in(relay.addr, "alice").await;
    alice.expect_quiet().await;
}

#[tokio::test]
async fn duplicate_login_is_rejected_and_closed() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;

    let mut imposter = Client::connect(relay.addr).await;
    imposter.send("login:alice").await;
    assert_eq!(
        imposter.expect_line().await,
        "Логин alice занят, попробуйте другой"
    );
    assert_eq!(imposter.recv().await, None);

    // The first alice is still connected and authenticated.
    let mut bob = Client::logged_in(relay.addr, "bob").await;
    alice.send("still here").await;
    assert_record(&bob.expect_line().await, "alice", "still here");

    wait_for_roster_len(&relay.state, 2).await;
    assert_eq!(relay.state.lock().await.roster.logins(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn replay_holds_only_ten_most_recent() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;
    let mut watcher = Client::logged_in(relay.addr, "watcher").await;

    for i in 1..=11 {
        alice.send(&format!("message {i}")).await;
    }
    // Once the watcher has all eleven, all are in history too.
    for i in 1..=11 {
        assert_record(&watcher.expect_line().await, "alice", &format!("message {i}"));
    }

    let mut bob = Client::logged_in(relay.addr, "bob").await;
    let replay = bob.expect_replay(10).await;
    for (record, i) in replay.iter().zip(2..=11) {
        assert_record(record, "alice", &format!("message {i}"));
    }
    bob.expect_quiet().await;
}

#[tokio::test]
async fn broadcast_reaches_others_but_not_sender() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;
    let mut bob = Client::logged_in(relay.addr, "bob").await;

    alice.send("hi").await;
    assert_record(&bob.expect_line().await, "alice", "hi");
    alice.expect_quiet().await;
}

// ── properties ──────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_same_login_has_single_winner() {
    let relay = start_relay().await;

    let attempts = (0..8).map(|_| {
        let addr = relay.addr;
        async move {
            let mut client = Client::connect(addr).await;
            client.send("login:contested").await;
            let first = client.expect_line().await;
            (first, client)
        }
    });
    let results = join_all(attempts).await;

    let winners = results
        .iter()
        .filter(|(line, _)| line == "Привет, contested")
        .count();
    let rejected = results
        .iter()
        .filter(|(line, _)| line == "Логин contested занят, попробуйте другой")
        .count();
    assert_eq!(winners, 1);
    assert_eq!(rejected, 7);

    for (line, mut client) in results {
        if line.starts_with("Логин") {
            assert_eq!(client.recv().await, None);
        }
    }
    wait_for_roster_len(&relay.state, 1).await;
    assert_eq!(relay.state.lock().await.roster.logins(), vec!["contested"]);
}

#[tokio::test]
async fn frames_before_login_are_ignored() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;

    let mut early = Client::connect(relay.addr).await;
    early.send("anyone there?").await;
    early.send("login:bob").await;
    assert_eq!(early.expect_line().await, "Привет, bob");

    alice.expect_quiet().await;
    assert!(relay.state.lock().await.history.is_empty());
}

#[tokio::test]
async fn unauthenticated_connection_is_in_roster() {
    let relay = start_relay().await;
    let _lurker = Client::connect(relay.addr).await;

    wait_for_roster_len(&relay.state, 1).await;
    assert!(relay.state.lock().await.roster.logins().is_empty());
}

#[tokio::test]
async fn repeated_login_frame_is_broadcast_verbatim() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;
    let mut bob = Client::logged_in(relay.addr, "bob").await;

    alice.send("login:carol").await;
    assert_record(&bob.expect_line().await, "alice", "login:carol");

    // Login did not change.
    assert_eq!(relay.state.lock().await.roster.logins(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn crlf_terminated_lines_are_accepted() {
    let relay = start_relay().await;
    let mut bob = Client::logged_in(relay.addr, "bob").await;

    let mut alice = Client::connect(relay.addr).await;
    alice.send_raw(b"login:alice\r\nhello\r\n").await;
    assert_eq!(alice.expect_line().await, "Привет, alice");
    assert_record(&bob.expect_line().await, "alice", "hello");
}

#[tokio::test]
async fn replay_arrives_once_and_live_messages_follow() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;
    let mut watcher = Client::logged_in(relay.addr, "watcher").await;

    alice.send("before").await;
    assert_record(&watcher.expect_line().await, "alice", "before");

    let mut bob = Client::logged_in(relay.addr, "bob").await;
    let replay = bob.expect_replay(1).await;
    assert_record(&replay[0], "alice", "before");

    alice.send("after").await;
    assert_record(&bob.expect_line().await, "alice", "after");
    bob.expect_quiet().await;
}

#[tokio::test]
async fn disconnect_frees_login_and_roster_slot() {
    let relay = start_relay().await;
    let alice = Client::logged_in(relay.addr, "alice").await;
    wait_for_roster_len(&relay.state, 1).await;

    drop(alice);
    wait_for_roster_len(&relay.state, 0).await;

    // Removing an already-removed session is harmless.
    assert!(relay.state.lock().await.roster.remove(1).is_none());

    let _again = Client::logged_in(relay.addr, "alice").await;
}

#[tokio::test]
async fn invalid_utf8_closes_only_that_session() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;
    let mut bob = Client::logged_in(relay.addr, "bob").await;

    bob.send_raw(&[0xff, 0xfe, b'\n']).await;
    assert_eq!(bob.recv().await, None);

    wait_for_roster_len(&relay.state, 1).await;
    let mut carol = Client::logged_in(relay.addr, "carol").await;
    alice.send("still up").await;
    assert_record(&carol.expect_line().await, "alice", "still up");
}

#[tokio::test]
async fn shutdown_closes_sessions_and_returns() {
    let relay = start_relay().await;
    let mut alice = Client::logged_in(relay.addr, "alice").await;

    relay.cancel.cancel();
    assert_eq!(alice.recv().await, None);

    let result = timeout(TEST_TIMEOUT, relay.handle)
        .await
        .expect("server did not stop")
        .expect("server task panicked");
    assert!(result.is_ok());
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let config = RelayConfig::default().with_overrides(&CliOverrides {
        host: Some("127.0.0.1".into()),
        port: Some(port),
    });
    match Server::bind(&config).await {
        Err(RelayError::Bind { addr, .. }) => assert_eq!(addr, format!("127.0.0.1:{port}")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bind unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn line_client_logs_in_and_sends() {
    let relay = start_relay().await;
    let mut bob = Client::logged_in(relay.addr, "bob").await;

    let stream = TcpStream::connect(relay.addr).await.unwrap();
    let mut output = Vec::new();
    timeout(
        TEST_TIMEOUT,
        chat_relay::cli::run_client(stream, "alice", &b"hello from cli\n"[..], &mut output),
    )
    .await
    .expect("client timed out")
    .expect("client failed");

    assert_record(&bob.expect_line().await, "alice", "hello from cli");
}

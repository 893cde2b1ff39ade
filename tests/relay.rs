/// End-to-end tests against an in-process relay on a loopback port.
///
/// Each test starts its own server, connects plain TCP clients, and checks
/// exactly which lines each client sees.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use chatrelay::relay::{notice, outbound};
use chatrelay::relay::{server, PhraseFilter, ServerState, SharedState};

const TIMEOUT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    state: SharedState,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(banned: &[&str]) -> Self {
        Self::start_with(banned, outbound::DEFAULT_CAPACITY).await
    }

    async fn start_with(banned: &[&str], outbound_capacity: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state: SharedState = Arc::new(
            ServerState::new("lobby", PhraseFilter::new(banned)).with_outbound_capacity(outbound_capacity),
        );
        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server::run(listener, Arc::clone(&state), async move {
            let _ = stop_rx.await;
        }));
        Self {
            addr,
            state,
            stop: Some(stop),
            task,
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Simple line-based chat client for testing.
struct TestClient {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    name: String,
}

impl TestClient {
    /// Connect without registering; the prompt is left unread.
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
            name: String::new(),
        }
    }

    /// Connect and register, reading through the welcome block.
    async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        assert_eq!(client.recv().await, notice::prompt("lobby"));
        client.send(name).await;
        client.name = name.to_owned();
        assert!(client.recv().await.starts_with("Connected clients: "));
        for line in notice::INSTRUCTIONS {
            assert_eq!(client.recv().await, line);
        }
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> String {
        self.try_recv()
            .await
            .unwrap_or_else(|| panic!("{}: connection closed", self.name))
    }

    async fn try_recv(&mut self) -> Option<String> {
        tokio::time::timeout(TIMEOUT, self.lines.next_line())
            .await
            .unwrap_or_else(|_| panic!("{}: timed out waiting for a line", self.name))
            .unwrap()
    }

    /// Round-trip a `/banned` query so everything sent before it has
    /// been processed and everything addressed to us has been read.
    async fn sync(&mut self) -> Vec<String> {
        self.send("/banned").await;
        let mut seen = Vec::new();
        loop {
            let line = self.recv().await;
            if line.starts_with("Banned phrases: ") {
                return seen;
            }
            seen.push(line);
        }
    }
}

#[tokio::test]
async fn join_broadcast_and_leave() {
    let server = TestServer::start(&[]).await;
    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut bob = TestClient::join(server.addr, "bob").await;

    assert_eq!(alice.recv().await, "bob has entered the chat.");

    bob.send("hello alice").await;
    assert_eq!(alice.recv().await, "bob: hello alice");
    assert!(bob.sync().await.is_empty(), "sender must not see its own broadcast");

    bob.send("exit").await;
    assert_eq!(alice.recv().await, "bob has left the chat.");
    assert_eq!(bob.try_recv().await, None);

    server.shutdown().await;
}

#[tokio::test]
async fn exclusion_broadcast_reaches_only_the_rest() {
    let server = TestServer::start(&[]).await;
    let mut a = TestClient::join(server.addr, "A").await;
    let mut b = TestClient::join(server.addr, "B").await;
    let mut c = TestClient::join(server.addr, "C").await;
    let mut d = TestClient::join(server.addr, "D").await;
    a.sync().await;
    b.sync().await;
    c.sync().await;

    a.send("/exclude B,C hello").await;
    assert_eq!(d.recv().await, "A: hello");
    assert!(a.sync().await.is_empty());
    assert!(b.sync().await.is_empty());
    assert!(c.sync().await.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn direct_message_with_missing_recipient() {
    let server = TestServer::start(&[]).await;
    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut sender = TestClient::join(server.addr, "sender").await;
    assert_eq!(alice.recv().await, "sender has entered the chat.");

    sender.send("/send alice,ghost hi").await;
    assert_eq!(alice.recv().await, "sender (private): hi");
    assert_eq!(
        sender.sync().await,
        vec!["User ghost not found. Available clients: alice, sender"]
    );

    server.shutdown().await;
}

#[tokio::test]
async fn banned_phrases_are_blocked_everywhere() {
    let server = TestServer::start(&["spam"]).await;
    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut bob = TestClient::join(server.addr, "bob").await;
    alice.sync().await;

    bob.send("this is SPAM").await;
    bob.send("/exclude carol spamx").await;
    bob.send("/send alice spam again").await;
    assert_eq!(
        bob.sync().await,
        vec![
            notice::BLOCKED_BROADCAST,
            notice::BLOCKED_BROADCAST,
            notice::BLOCKED_DIRECT,
        ]
    );
    bob.send("spa m is fine").await;
    assert_eq!(alice.recv().await, "bob: spa m is fine");
    assert!(alice.sync().await.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn duplicate_name_is_refused_and_closed() {
    let server = TestServer::start(&[]).await;
    let mut alice = TestClient::join(server.addr, "alice").await;

    let mut imposter = TestClient::connect(server.addr).await;
    imposter.recv().await;
    imposter.send("alice").await;
    assert_eq!(imposter.recv().await, notice::name_taken("alice"));
    assert_eq!(imposter.try_recv().await, None);

    // No join or leave notice for a session that never became active.
    assert!(alice.sync().await.is_empty());
    assert_eq!(server.state.registry().snapshot_names(), vec!["alice"]);

    server.shutdown().await;
}

#[tokio::test]
async fn blank_name_gets_default_and_crlf_is_accepted() {
    let server = TestServer::start(&[]).await;
    let mut anon = TestClient::connect(server.addr).await;
    anon.recv().await;
    let port = anon.writer.local_addr().unwrap().port();
    anon.writer.write_all(b"   \r\n").await.unwrap();

    let expected = format!("Client-{port}");
    assert_eq!(anon.recv().await, format!("Connected clients: {expected}"));
    assert!(server.state.registry().contains(&expected));

    server.shutdown().await;
}

#[tokio::test]
async fn abrupt_disconnect_is_announced_once() {
    let server = TestServer::start(&[]).await;
    let mut alice = TestClient::join(server.addr, "alice").await;
    let bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "bob has entered the chat.");

    drop(bob);
    assert_eq!(alice.recv().await, "bob has left the chat.");
    assert!(alice.sync().await.is_empty());

    // The name is free again.
    let _bob2 = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "bob has entered the chat.");

    server.shutdown().await;
}

#[tokio::test]
async fn concurrent_senders_never_interleave_lines() {
    const SENDERS: usize = 8;
    const PER_SENDER: usize = 25;

    let server = TestServer::start(&[]).await;
    let mut listener = TestClient::join(server.addr, "listener").await;

    let mut senders = Vec::new();
    for i in 0..SENDERS {
        senders.push(TestClient::join(server.addr, &format!("s{i}")).await);
    }
    // Drain the join notices.
    let joins = listener.sync().await;
    assert_eq!(joins.len(), SENDERS);

    let mut tasks = Vec::new();
    for mut sender in senders {
        tasks.push(tokio::spawn(async move {
            for j in 0..PER_SENDER {
                let text = format!("{} message {j} {}", sender.name, "x".repeat(200));
                sender.send(&text).await;
            }
            sender.sync().await;
            sender
        }));
    }
    let mut finished = Vec::new();
    for t in tasks {
        finished.push(t.await.unwrap());
    }

    let mut next = vec![0usize; SENDERS];
    for _ in 0..SENDERS * PER_SENDER {
        let line = listener.recv().await;
        let (who, body) = line.split_once(": ").expect("whole chat line");
        let i: usize = who.trim_start_matches('s').parse().unwrap();
        assert_eq!(body, format!("{who} message {} {}", next[i], "x".repeat(200)));
        next[i] += 1;
    }
    assert!(next.iter().all(|n| *n == PER_SENDER));

    drop(finished);
    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_notifies_every_session() {
    let server = TestServer::start(&[]).await;
    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut waiting = TestClient::connect(server.addr).await;
    waiting.recv().await;

    let state = Arc::clone(&server.state);
    server.shutdown().await;

    assert_eq!(alice.recv().await, notice::SHUTTING_DOWN);
    assert_eq!(alice.try_recv().await, None);
    assert_eq!(waiting.recv().await, notice::SHUTTING_DOWN);
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn shutdown_with_several_members_sends_no_leave_notices() {
    let server = TestServer::start(&[]).await;
    let mut clients = Vec::new();
    for name in ["alice", "bob", "carol"] {
        clients.push(TestClient::join(server.addr, name).await);
    }
    for client in &mut clients {
        client.sync().await;
    }

    let state = Arc::clone(&server.state);
    server.shutdown().await;

    for client in &mut clients {
        assert_eq!(client.recv().await, notice::SHUTTING_DOWN);
        assert_eq!(client.try_recv().await, None);
    }
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn stalled_reader_is_dropped_without_holding_up_others() {
    const LINES: usize = 4000;

    let server = TestServer::start(&[]).await;
    let mut talker = TestClient::join(server.addr, "talker").await;
    let mut reader = TestClient::join(server.addr, "reader").await;
    // Joins, then never reads again.
    let _stuck = TestClient::join(server.addr, "stuck").await;
    talker.sync().await;
    reader.sync().await;

    let reading = tokio::spawn(async move {
        let mut chat = 0;
        let mut stuck_left = false;
        while chat < LINES || !stuck_left {
            let line = reader.recv().await;
            if line == "stuck has left the chat." {
                stuck_left = true;
            } else {
                assert!(line.starts_with("talker: "), "unexpected line {line:?}");
                chat += 1;
            }
        }
        reader
    });

    // Far more than the stuck peer's socket buffers plus its queue can hold.
    let body = "x".repeat(4000);
    for _ in 0..LINES {
        talker.send(&body).await;
    }

    let _reader = tokio::time::timeout(Duration::from_secs(30), reading)
        .await
        .expect("reader fell behind")
        .unwrap();
    assert!(!server.state.registry().contains("stuck"));
    assert!(server.state.registry().contains("reader"));

    server.shutdown().await;
}

//! End-to-end tests over real TCP connections.
//!
//! Each test boots a server on a free port and drives it with raw
//! line-oriented sockets (for exact wire assertions) or with `SyncClient`
//! (for the convergence path).

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use scrawl_collab::client::{ConnectionState, SyncClient, SyncEvent};
use scrawl_collab::server::{ServerConfig, SyncServer};
use scrawl_core::shape::Shape;

const TIMEOUT: Duration = Duration::from_secs(2);
const BLACK: i32 = -16777216;

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server on a free port; returns the port and a handle for
/// inspecting the master state.
async fn start_test_server() -> (u16, SyncServer) {
    let port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        outbound_capacity: 64,
    };
    let server = SyncServer::new(config);
    let runner = server.clone();
    tokio::spawn(async move {
        runner.run().await.unwrap();
    });
    // Give the server time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, server)
}

/// A raw protocol connection with line-level assertions.
struct RawClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl RawClient {
    async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            write: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
    }

    async fn expect_line(&mut self) -> String {
        timeout(TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read error")
            .expect("connection closed unexpectedly")
    }

    async fn expect_eof(&mut self) {
        let line = timeout(TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for EOF")
            .expect("read error");
        assert_eq!(line, None, "expected the server to close the connection");
    }

    /// Consume a full resync: `clear`, the shape lines, `curId <n>`.
    async fn read_resync(&mut self) -> (Vec<String>, i32) {
        assert_eq!(self.expect_line().await, "clear");
        let mut shapes = Vec::new();
        loop {
            let line = self.expect_line().await;
            if let Some(n) = line.strip_prefix("curId ") {
                return (shapes, n.parse().unwrap());
            }
            shapes.push(line);
        }
    }

    /// Connect and authenticate, consuming the prompt and initial resync.
    async fn authenticate(port: u16, password: &str) -> (Self, Vec<String>, i32) {
        let mut client = Self::connect(port).await;
        let prompt = client.expect_line().await;
        assert!(prompt.starts_with("print "), "expected a prompt, got {prompt:?}");
        client.send(password).await;
        let (shapes, cur_id) = client.read_resync().await;
        (client, shapes, cur_id)
    }
}

/// Wait for an event matching the predicate, skipping others.
async fn wait_for_event(
    rx: &mut tokio::sync::mpsc::Receiver<SyncEvent>,
    mut pred: impl FnMut(&SyncEvent) -> bool,
) -> SyncEvent {
    loop {
        let event = timeout(TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_first_client_sets_password_and_gets_empty_resync() {
    let (port, _server) = start_test_server().await;

    let mut client = RawClient::connect(port).await;
    assert_eq!(
        client.expect_line().await,
        "print What would you like the password to be?"
    );
    client.send("secret").await;
    let (shapes, cur_id) = client.read_resync().await;
    assert!(shapes.is_empty());
    assert_eq!(cur_id, 0);
}

#[tokio::test]
async fn test_wrong_password_is_disconnected_then_retry_succeeds() {
    let (port, server) = start_test_server().await;
    let (_c1, _, _) = RawClient::authenticate(port, "secret").await;

    let mut intruder = RawClient::connect(port).await;
    assert_eq!(
        intruder.expect_line().await,
        "print Please enter the password to connect to this server."
    );
    intruder.send("wrong").await;
    assert_eq!(intruder.expect_line().await, "print Password invalid.");
    intruder.expect_eof().await;

    // Retry with the right password: a resync of an empty document.
    let (_c2, shapes, cur_id) = RawClient::authenticate(port, "secret").await;
    assert!(shapes.is_empty());
    assert_eq!(cur_id, 0);

    let stats = server.stats().await;
    assert_eq!(stats.auth_failures, 1);
    assert_eq!(stats.active_connections, 2);
}

#[tokio::test]
async fn test_add_assigns_id_zero_and_echoes_to_everyone() {
    let (port, server) = start_test_server().await;
    let (mut c1, _, _) = RawClient::authenticate(port, "secret").await;
    let (mut c2, _, _) = RawClient::authenticate(port, "secret").await;

    let line = "add rect 10 10 50 50 -16777216";
    c1.send(line).await;

    // Broadcast symmetry: the sender hears its own command, verbatim.
    assert_eq!(c1.expect_line().await, line);
    assert_eq!(c2.expect_line().await, line);

    let doc = server.snapshot().await;
    assert_eq!(doc.get(0), Some(&Shape::rect(10, 10, 50, 50, BLACK)));
    assert_eq!(doc.next_id(), 1);
}

#[tokio::test]
async fn test_late_joiner_is_resynced_with_current_state() {
    let (port, _server) = start_test_server().await;
    let (mut c1, _, _) = RawClient::authenticate(port, "secret").await;

    c1.send("add rect 10 10 50 50 -16777216").await;
    c1.expect_line().await;
    c1.send("add polyline [0,0;5,0;5,5] 7").await;
    c1.expect_line().await;

    let (_c2, shapes, cur_id) = RawClient::authenticate(port, "secret").await;
    assert_eq!(
        shapes,
        vec![
            "0 rect 10 10 50 50 -16777216".to_string(),
            "1 polyline [0,0;5,0;5,5] 7".to_string(),
        ]
    );
    assert_eq!(cur_id, 2);
}

#[tokio::test]
async fn test_save_state_undo_redo_roundtrip() {
    let (port, server) = start_test_server().await;
    let (mut client, _, _) = RawClient::authenticate(port, "secret").await;

    client.send("add rect 10 10 50 50 -16777216").await;
    assert_eq!(client.expect_line().await, "add rect 10 10 50 50 -16777216");

    // History control is never rebroadcast; the next thing the client hears
    // is the echo of its own remove.
    client.send("save_state").await;
    client.send("remove 0").await;
    assert_eq!(client.expect_line().await, "remove 0");

    // Undo pushes a full resync restoring the save point.
    client.send("undo").await;
    let (shapes, cur_id) = client.read_resync().await;
    assert_eq!(shapes, vec!["0 rect 10 10 50 50 -16777216".to_string()]);
    assert_eq!(cur_id, 1);

    // Redo pushes a resync of the post-remove state.
    client.send("redo").await;
    let (shapes, cur_id) = client.read_resync().await;
    assert!(shapes.is_empty());
    assert_eq!(cur_id, 1);
    assert!(server.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_undo_resyncs_every_connection() {
    let (port, _server) = start_test_server().await;
    let (mut c1, _, _) = RawClient::authenticate(port, "secret").await;
    let (mut c2, _, _) = RawClient::authenticate(port, "secret").await;

    c1.send("add segment 0 0 9 9 255").await;
    c1.expect_line().await;
    c2.expect_line().await;

    c1.send("save_state").await;
    c1.send("remove 0").await;
    c1.expect_line().await;
    c2.expect_line().await;

    c2.send("undo").await;
    let (shapes1, _) = c1.read_resync().await;
    let (shapes2, _) = c2.read_resync().await;
    assert_eq!(shapes1, vec!["0 segment 0 0 9 9 255".to_string()]);
    assert_eq!(shapes2, shapes1);
}

#[tokio::test]
async fn test_invalid_input_is_dropped_without_killing_the_session() {
    let (port, server) = start_test_server().await;
    let (mut client, _, _) = RawClient::authenticate(port, "secret").await;

    client.send("teleport everything").await; // unknown command
    client.send("remove 99").await; // invalid reference
    client.send("add rect 1 2 three 4 5").await; // malformed shape

    // None of the above is rebroadcast; the session survives them all.
    client.send("add segment 0 0 5 5 7").await;
    assert_eq!(client.expect_line().await, "add segment 0 0 5 5 7");

    let stats = server.stats().await;
    assert_eq!(stats.commands_rejected, 3);
    assert_eq!(stats.commands_applied, 1);
}

#[tokio::test]
async fn test_boundary_undo_is_an_informational_noop() {
    let (port, server) = start_test_server().await;
    let (mut client, _, _) = RawClient::authenticate(port, "secret").await;

    client.send("undo").await; // nothing to undo: no resync, no broadcast
    client.send("redo").await; // nothing to redo either
    client.send("add rect 0 0 1 1 0").await;
    assert_eq!(client.expect_line().await, "add rect 0 0 1 1 0");

    // Boundary no-ops count as accepted, never as rejected.
    let stats = server.stats().await;
    assert_eq!(stats.commands_applied, 3);
    assert_eq!(stats.commands_rejected, 0);
}

#[tokio::test]
async fn test_explicit_id_add_reconciles_and_rebroadcasts() {
    let (port, server) = start_test_server().await;
    let (mut c1, _, _) = RawClient::authenticate(port, "secret").await;
    let (mut c2, _, _) = RawClient::authenticate(port, "secret").await;

    c1.send("5 ellipse 0 0 20 10 255").await;
    assert_eq!(c1.expect_line().await, "5 ellipse 0 0 20 10 255");
    assert_eq!(c2.expect_line().await, "5 ellipse 0 0 20 10 255");

    let doc = server.snapshot().await;
    assert_eq!(doc.get(5), Some(&Shape::ellipse(0, 0, 20, 10, 255)));
    assert_eq!(doc.next_id(), 6);
}

#[tokio::test]
async fn test_disconnect_unregisters_from_broadcast() {
    let (port, server) = start_test_server().await;
    let (mut c1, _, _) = RawClient::authenticate(port, "secret").await;
    let (c2, _, _) = RawClient::authenticate(port, "secret").await;

    drop(c2);
    // Give the server a moment to notice the hangup.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.stats().await.active_connections, 1);

    // Fan-out still works for the survivor.
    c1.send("add rect 0 0 1 1 0").await;
    assert_eq!(c1.expect_line().await, "add rect 0 0 1 1 0");
}

#[tokio::test]
async fn test_evicted_connection_stops_mutating_the_document() {
    let port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        outbound_capacity: 4,
    };
    let server = SyncServer::new(config);
    let runner = server.clone();
    tokio::spawn(async move {
        runner.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut c1, _, _) = RawClient::authenticate(port, "secret").await;
    let (mut c2, _, _) = RawClient::authenticate(port, "secret").await;

    // c2 stops reading. Flood with large broadcasts until its transport
    // backs up, its outbound queue overflows, and the roster drops it.
    let points = (0..8000)
        .map(|i| format!("{i},{i}"))
        .collect::<Vec<_>>()
        .join(";");
    let flood = format!("add polyline [{points}] 1");
    let mut evicted = false;
    for _ in 0..400 {
        c1.send(&flood).await;
        c1.expect_line().await;
        if server.stats().await.active_connections == 1 {
            evicted = true;
            break;
        }
    }
    assert!(evicted, "the stalled connection was never evicted");

    // A command from the evicted connection ends its session instead of
    // mutating the master.
    c2.send("add rect 7 7 8 8 0").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let marker = Shape::rect(7, 7, 8, 8, 0);
    assert!(server.snapshot().await.iter().all(|(_, s)| s != &marker));

    // The survivor keeps working and never hears from the dead session.
    c1.send("add rect 1 1 2 2 0").await;
    assert_eq!(c1.expect_line().await, "add rect 1 1 2 2 0");
}

#[tokio::test]
async fn test_sync_client_connects_and_converges() {
    let (port, _server) = start_test_server().await;
    let addr = format!("127.0.0.1:{port}");

    let mut c1 = SyncClient::new();
    let mut rx1 = c1.take_event_rx().unwrap();
    c1.connect(&addr, "secret").await.unwrap();
    wait_for_event(&mut rx1, |e| matches!(e, SyncEvent::Connected)).await;
    assert_eq!(c1.connection_state().await, ConnectionState::Connected);

    let shape = Shape::rect(10, 10, 50, 50, BLACK);
    assert!(c1.add(&shape).await);
    wait_for_event(&mut rx1, |e| matches!(e, SyncEvent::Applied(_))).await;

    let doc = c1.document().await;
    assert_eq!(doc.get(0), Some(&shape));
    assert_eq!(doc.next_id(), 1);
}

#[tokio::test]
async fn test_two_sync_clients_see_identical_documents() {
    let (port, _server) = start_test_server().await;
    let addr = format!("127.0.0.1:{port}");

    let mut c1 = SyncClient::new();
    let mut rx1 = c1.take_event_rx().unwrap();
    c1.connect(&addr, "secret").await.unwrap();
    wait_for_event(&mut rx1, |e| matches!(e, SyncEvent::Connected)).await;

    let mut c2 = SyncClient::new();
    let mut rx2 = c2.take_event_rx().unwrap();
    c2.connect(&addr, "secret").await.unwrap();
    wait_for_event(&mut rx2, |e| matches!(e, SyncEvent::Connected)).await;

    assert!(c1.add(&Shape::segment(0, 0, 9, 9, 255)).await);
    wait_for_event(&mut rx1, |e| matches!(e, SyncEvent::Applied(_))).await;
    wait_for_event(&mut rx2, |e| matches!(e, SyncEvent::Applied(_))).await;

    assert!(c2.move_shape(0, 5, 5).await);
    wait_for_event(&mut rx1, |e| matches!(e, SyncEvent::Applied(_))).await;
    wait_for_event(&mut rx2, |e| matches!(e, SyncEvent::Applied(_))).await;

    assert_eq!(c1.document().await, c2.document().await);
    assert_eq!(
        c1.document().await.get(0),
        Some(&Shape::segment(5, 5, 14, 14, 255))
    );
}

#[tokio::test]
async fn test_rejected_sync_client_reports_disconnect() {
    let (port, _server) = start_test_server().await;
    let addr = format!("127.0.0.1:{port}");

    let (_c1, _, _) = RawClient::authenticate(port, "secret").await;

    let mut intruder = SyncClient::new();
    let mut rx = intruder.take_event_rx().unwrap();
    intruder.connect(&addr, "wrong").await.unwrap();
    wait_for_event(&mut rx, |e| matches!(e, SyncEvent::Disconnected)).await;
    assert_eq!(intruder.connection_state().await, ConnectionState::Disconnected);
    assert!(intruder.document().await.is_empty());
}

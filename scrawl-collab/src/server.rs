//! TCP sync server holding the master document.
//!
//! Architecture:
//! ```text
//! Client A ──┐                    ┌── writer task A ──► Client A
//!            ├── Mutex<Shared> ───┤
//! Client B ──┘        │           └── writer task B ──► Client B
//!                     │
//!              ┌──────┴──────┐
//!              │ History     │  bounded snapshot window (undo/redo)
//!              │ Roster      │  broadcast registry
//!              │ SessionGate │  shared-secret admission
//!              └─────────────┘
//! ```
//!
//! One task per connection blocks on line reads; every touch of the shared
//! state goes through the single mutex, and nothing under that lock awaits,
//! so command application plus its fan-out enqueue is atomic with respect to
//! every other connection. Valid mutating commands are rebroadcast as the
//! original line, verbatim, to all connections including the sender; history
//! commands are never rebroadcast, but a successful undo or redo pushes a
//! full resync batch to everyone.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use scrawl_core::document::Document;
use scrawl_core::history::History;

use crate::broadcast::{ConnId, Outbound, Roster, RosterStats};
use crate::protocol::{Command, Update};
use crate::session::{
    Admission, SessionGate, SessionState, PROMPT_ENTER, PROMPT_SET, REJECT_NOTICE,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Outbound queue capacity per connection, in messages
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4242".to_string(),
            outbound_capacity: 256,
        }
    }
}

/// Server counters.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub auth_failures: u64,
    /// Accepted commands, including history no-ops at a window boundary
    /// (an undo with nothing to undo counts here, not as rejected).
    pub commands_applied: u64,
    /// Unparseable lines plus commands naming an invalid ID.
    pub commands_rejected: u64,
}

/// What a command did, and what the rest of the world should hear about it.
enum Outcome {
    /// Document mutated; relay the original line to everyone.
    Broadcast,
    /// History cursor moved; everyone needs a full resync.
    ResyncAll,
    /// Applied (or boundary no-op) with nothing to send.
    Quiet,
    /// Invalid reference; the no-op is not rebroadcast.
    Rejected,
}

/// Everything behind the single coarse lock.
struct Shared {
    history: History,
    roster: Roster,
    gate: SessionGate,
    stats: ServerStats,
}

impl Shared {
    fn new() -> Self {
        Self {
            history: History::new(),
            roster: Roster::new(),
            gate: SessionGate::new(),
            stats: ServerStats::default(),
        }
    }

    /// Apply one parsed command to the master state.
    fn apply(&mut self, cmd: Command) -> Outcome {
        match cmd {
            Command::Add(shape) => {
                let id = self.history.current_mut().append(shape);
                log::info!("new shape added at id {id}");
                Outcome::Broadcast
            }
            Command::PutShape { id, shape } => {
                if self.history.current_mut().put(id, shape) {
                    log::info!("shape reconciled at id {id}");
                    Outcome::Broadcast
                } else {
                    Outcome::Rejected
                }
            }
            Command::Move { id, dx, dy } => {
                if self.history.current_mut().translate(id, dx, dy) {
                    Outcome::Broadcast
                } else {
                    Outcome::Rejected
                }
            }
            Command::Recolor { id, color } => {
                if self.history.current_mut().recolor(id, color) {
                    Outcome::Broadcast
                } else {
                    Outcome::Rejected
                }
            }
            Command::Remove(id) => {
                if self.history.current_mut().remove(id) {
                    Outcome::Broadcast
                } else {
                    Outcome::Rejected
                }
            }
            Command::Bottom(id) => {
                if self.history.current_mut().send_to_back(id) {
                    Outcome::Broadcast
                } else {
                    Outcome::Rejected
                }
            }
            Command::Top(id) => {
                if self.history.current_mut().send_to_front(id) {
                    Outcome::Broadcast
                } else {
                    Outcome::Rejected
                }
            }
            Command::SaveState => {
                self.history.save_point();
                Outcome::Quiet
            }
            Command::Undo => {
                if self.history.undo() {
                    Outcome::ResyncAll
                } else {
                    Outcome::Quiet
                }
            }
            Command::Redo => {
                if self.history.redo() {
                    Outcome::ResyncAll
                } else {
                    Outcome::Quiet
                }
            }
        }
    }

    /// Note connections evicted during a fan-out.
    fn reap(&mut self, dead: Vec<ConnId>) {
        for id in dead {
            self.stats.active_connections = self.stats.active_connections.saturating_sub(1);
            log::warn!("connection {id} dropped from roster (stalled or closed)");
        }
    }
}

/// The full-state sync sequence for the given document: a reset, every shape
/// as an explicit-ID add in draw order, then the master's ID counter.
fn resync_lines(doc: &Document) -> Vec<String> {
    let mut lines = Vec::with_capacity(doc.len() + 2);
    lines.push(Update::clear_line());
    for (id, shape) in doc.iter() {
        lines.push(format!("{id} {}", shape.encode()));
    }
    lines.push(Update::cur_id_line(doc.next_id()));
    lines
}

/// The sync server. Cheap to clone; all clones share one master state.
#[derive(Clone)]
pub struct SyncServer {
    config: ServerConfig,
    shared: Arc<Mutex<Shared>>,
    next_conn_id: Arc<AtomicU64>,
}

impl SyncServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared::new())),
            next_conn_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Accept connections forever, one handler task per client.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("server ready for connections on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
            let shared = self.shared.clone();
            let capacity = self.config.outbound_capacity;

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(stream, addr, conn_id, shared.clone(), capacity).await
                {
                    log::warn!("connection {conn_id} from {addr} ended with error: {e}");
                }
                // Unregister on every exit path, error or not.
                let mut sh = shared.lock().await;
                if sh.roster.remove(conn_id) {
                    sh.stats.active_connections =
                        sh.stats.active_connections.saturating_sub(1);
                    log::info!("connection {conn_id} from {addr} disconnected");
                }
            });
        }
    }

    pub async fn stats(&self) -> ServerStats {
        self.shared.lock().await.stats.clone()
    }

    pub async fn roster_stats(&self) -> RosterStats {
        self.shared.lock().await.roster.stats()
    }

    /// A snapshot of the current master document.
    pub async fn snapshot(&self) -> Document {
        self.shared.lock().await.history.current().clone()
    }
}

async fn write_line(write_half: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await
}

/// One client session: password handshake, initial resync, then the
/// read-parse-apply-broadcast loop until the stream ends.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnId,
    shared: Arc<Mutex<Shared>>,
    capacity: usize,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).lines();

    let (tx, mut rx) = mpsc::channel::<Outbound>(capacity);

    // Writer task: the only place this connection's transport is written, so
    // a resync batch can never interleave with a broadcast line.
    tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let result = match out {
                Outbound::Line(line) => write_line(&mut write_half, &line).await,
                Outbound::Resync(lines) => {
                    let mut result = Ok(());
                    for line in &lines {
                        result = write_line(&mut write_half, line).await;
                        if result.is_err() {
                            break;
                        }
                    }
                    result
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    let mut state = SessionState::Connecting;
    log::debug!("connection {conn_id} from {addr}: {state:?}");

    let prompt = {
        let mut sh = shared.lock().await;
        sh.stats.total_connections += 1;
        if sh.gate.has_password() {
            PROMPT_ENTER
        } else {
            PROMPT_SET
        }
    };
    if tx.send(Outbound::Line(Update::notice_line(prompt))).await.is_err() {
        return Ok(());
    }

    state = SessionState::AwaitingPassword;
    log::debug!("connection {conn_id} from {addr}: {state:?}");
    let Some(password_line) = reader.next_line().await? else {
        // Hung up before answering the prompt.
        return Ok(());
    };

    {
        let mut sh = shared.lock().await;
        match sh.gate.admit(&password_line) {
            Admission::Rejected => {
                state = SessionState::Rejected;
                sh.stats.auth_failures += 1;
                drop(sh);
                log::info!(
                    "connection {conn_id} from {addr} failed the password check: {state:?}"
                );
                let _ = tx
                    .send(Outbound::Line(Update::notice_line(REJECT_NOTICE)))
                    .await;
                // Dropping tx lets the writer drain the notice, then the
                // transport closes. Never registered, so nothing to clean up.
                return Ok(());
            }
            Admission::Adopted | Admission::Accepted => {
                state = SessionState::Authenticated;
                sh.stats.active_connections += 1;
                // Registration and the initial full resync happen under one
                // lock scope: no broadcast can slip in between.
                sh.roster.insert(conn_id, tx.clone());
                let lines = resync_lines(sh.history.current());
                sh.roster.send_to(conn_id, Outbound::Resync(lines));
            }
        }
    }
    log::debug!("connection {conn_id} from {addr}: {state:?}");
    // The roster now owns the only outbound handle.
    drop(tx);

    while let Some(line) = reader.next_line().await? {
        let mut sh = shared.lock().await;
        // Evicted during a fan-out (stalled queue, closed transport): the
        // session is over, so its input must not keep mutating the master.
        if !sh.roster.contains(conn_id) {
            log::info!("connection {conn_id} from {addr} is off the roster, ending session");
            break;
        }
        match Command::parse(&line) {
            Ok(cmd) => match sh.apply(cmd) {
                Outcome::Broadcast => {
                    sh.stats.commands_applied += 1;
                    let dead = sh.roster.broadcast(&line);
                    sh.reap(dead);
                }
                Outcome::ResyncAll => {
                    sh.stats.commands_applied += 1;
                    let lines = resync_lines(sh.history.current());
                    let dead = sh.roster.resync_all(&lines);
                    sh.reap(dead);
                }
                Outcome::Quiet => {
                    sh.stats.commands_applied += 1;
                }
                Outcome::Rejected => {
                    sh.stats.commands_rejected += 1;
                    log::debug!(
                        "connection {conn_id}: no-op for {line:?} (invalid reference)"
                    );
                }
            },
            Err(e) => {
                sh.stats.commands_rejected += 1;
                log::warn!("connection {conn_id}: dropped invalid command {line:?}: {e}");
            }
        }
    }

    Ok(())
}

//! Headless sync client.
//!
//! Maintains a local copy of the document that converges on the server's
//! master: every line the server sends (relayed commands, `clear`, `curId`,
//! `print`) is applied in arrival order. The client's own edits go out as
//! protocol lines and take local effect only when the server echoes them
//! back, so local and master state stay bit-identical.
//!
//! Rendering and mouse interaction live elsewhere; this is the wire half a
//! UI would sit on top of.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};

use scrawl_core::document::Document;
use scrawl_core::shape::Shape;

use crate::protocol::{Command, Update};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingPassword,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Authenticated and resynced for the first time
    Connected,
    /// Connection lost or refused
    Disconnected,
    /// A `print` console notice from the server
    Notice(String),
    /// The local document was reset by a resync
    DocumentReset,
    /// A relayed command was applied to the local document
    Applied(Command),
}

/// Apply a relayed command to a local document copy.
///
/// Mirrors the server's own application, minus validation noise: the server
/// only relays commands it accepted, so failures here are stale-state
/// artifacts that the next resync repairs.
fn apply_to_document(doc: &mut Document, cmd: &Command) {
    match cmd {
        Command::Add(shape) => {
            doc.append(shape.clone());
        }
        Command::PutShape { id, shape } => {
            doc.put(*id, shape.clone());
        }
        Command::Move { id, dx, dy } => {
            doc.translate(*id, *dx, *dy);
        }
        Command::Recolor { id, color } => {
            doc.recolor(*id, *color);
        }
        Command::Remove(id) => {
            doc.remove(*id);
        }
        Command::Bottom(id) => {
            doc.send_to_back(*id);
        }
        Command::Top(id) => {
            doc.send_to_front(*id);
        }
        // History commands are never rebroadcast; nothing to apply locally.
        Command::SaveState | Command::Undo | Command::Redo => {}
    }
}

/// The sync client.
pub struct SyncClient {
    /// Local copy of the master document
    document: Arc<RwLock<Document>>,
    /// Connection state
    state: Arc<RwLock<ConnectionState>>,
    /// Channel to the writer task
    outgoing_tx: Option<mpsc::Sender<String>>,
    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<SyncEvent>,
}

impl Default for SyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncClient {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            document: Arc::new(RwLock::new(Document::new())),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect and authenticate.
    ///
    /// The server reads exactly one line before anything else, the password,
    /// so it is sent immediately; the handshake prompt arrives as a
    /// [`SyncEvent::Notice`]. Spawns the reader and writer tasks.
    pub async fn connect(&mut self, addr: &str, password: &str) -> std::io::Result<()> {
        *self.state.write().await = ConnectionState::Connecting;
        let stream = TcpStream::connect(addr).await?;
        let (read_half, mut write_half) = stream.into_split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx.clone());

        // Writer task: forward outgoing lines to the socket.
        tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
        });

        *self.state.write().await = ConnectionState::AwaitingPassword;
        if out_tx.send(password.to_string()).await.is_err() {
            *self.state.write().await = ConnectionState::Disconnected;
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed before the password was sent",
            ));
        }

        // Reader task: apply every server line to the local document.
        let document = self.document.clone();
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        Self::apply_line(&document, &state, &event_tx, &line).await;
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    async fn apply_line(
        document: &Arc<RwLock<Document>>,
        state: &Arc<RwLock<ConnectionState>>,
        event_tx: &mpsc::Sender<SyncEvent>,
        line: &str,
    ) {
        match Update::parse(line) {
            Ok(Update::Notice(text)) => {
                let _ = event_tx.send(SyncEvent::Notice(text)).await;
            }
            Ok(Update::Clear) => {
                // The first resync doubles as the authentication signal: a
                // rejected connection never receives one.
                let newly_connected = {
                    let mut st = state.write().await;
                    let was_waiting = *st == ConnectionState::AwaitingPassword;
                    *st = ConnectionState::Connected;
                    was_waiting
                };
                *document.write().await = Document::new();
                if newly_connected {
                    let _ = event_tx.send(SyncEvent::Connected).await;
                }
                let _ = event_tx.send(SyncEvent::DocumentReset).await;
            }
            Ok(Update::CurId(next_id)) => {
                document.write().await.set_next_id(next_id);
            }
            Ok(Update::Apply(cmd)) => {
                apply_to_document(&mut *document.write().await, &cmd);
                let _ = event_tx.send(SyncEvent::Applied(cmd)).await;
            }
            Err(e) => {
                log::warn!("ignoring unparseable server line {line:?}: {e}");
            }
        }
    }

    /// Send a raw protocol line. False when not connected.
    pub async fn send_line(&self, line: String) -> bool {
        match &self.outgoing_tx {
            Some(tx) => tx.send(line).await.is_ok(),
            None => false,
        }
    }

    /// Request appending a shape; the master assigns the ID.
    pub async fn add(&self, shape: &Shape) -> bool {
        self.send_line(Command::Add(shape.clone()).encode()).await
    }

    pub async fn move_shape(&self, id: i32, dx: i32, dy: i32) -> bool {
        self.send_line(Command::Move { id, dx, dy }.encode()).await
    }

    pub async fn recolor(&self, id: i32, color: i32) -> bool {
        self.send_line(Command::Recolor { id, color }.encode()).await
    }

    pub async fn remove(&self, id: i32) -> bool {
        self.send_line(Command::Remove(id).encode()).await
    }

    pub async fn send_to_back(&self, id: i32) -> bool {
        self.send_line(Command::Bottom(id).encode()).await
    }

    pub async fn send_to_front(&self, id: i32) -> bool {
        self.send_line(Command::Top(id).encode()).await
    }

    pub async fn save_state(&self) -> bool {
        self.send_line(Command::SaveState.encode()).await
    }

    pub async fn undo(&self) -> bool {
        self.send_line(Command::Undo.encode()).await
    }

    pub async fn redo(&self) -> bool {
        self.send_line(Command::Redo.encode()).await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// A snapshot of the local document copy.
    pub async fn document(&self) -> Document {
        self.document.read().await.clone()
    }
}

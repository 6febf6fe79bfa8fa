//! Fan-out to every live connection.
//!
//! Each connection owns a writer task fed by a bounded mpsc queue; the roster
//! maps connection IDs to the sending ends. A broadcast enqueues the same
//! line, verbatim, to every registered connection, the originator included,
//! so a sender's local copy and the master converge on identical bytes.
//!
//! A full resync travels as one [`Outbound::Resync`] batch. The writer task
//! consumes whole `Outbound` values, so a resync can never interleave with a
//! normal broadcast on the same transport.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Server-assigned connection identifier.
pub type ConnId = u64;

/// One unit of outbound traffic for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A single protocol line.
    Line(String),
    /// A full-state batch, written without interleaving.
    Resync(Vec<String>),
}

/// Roster health counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterStats {
    pub lines_sent: u64,
    pub lines_dropped: u64,
    pub active_connections: usize,
}

/// Registry of authenticated connections eligible for fan-out.
///
/// Lives behind the server's shared lock; every method is synchronous so the
/// lock is never held across an await point. A connection whose queue is full
/// or closed is evicted on the spot and reported to the caller.
#[derive(Debug, Default)]
pub struct Roster {
    conns: HashMap<ConnId, mpsc::Sender<Outbound>>,
    lines_sent: u64,
    lines_dropped: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue.
    pub fn insert(&mut self, id: ConnId, tx: mpsc::Sender<Outbound>) {
        self.conns.insert(id, tx);
    }

    /// Unregister a connection. True if it was registered.
    pub fn remove(&mut self, id: ConnId) -> bool {
        self.conns.remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.conns.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Enqueue one message for a single connection (the initial resync path).
    /// False evicts nothing; the caller decides what to do with a newcomer
    /// whose queue is already unusable.
    pub fn send_to(&mut self, id: ConnId, out: Outbound) -> bool {
        let Some(tx) = self.conns.get(&id) else {
            return false;
        };
        match tx.try_send(out) {
            Ok(()) => {
                self.lines_sent += 1;
                true
            }
            Err(_) => {
                self.lines_dropped += 1;
                false
            }
        }
    }

    /// Fan one line out to every registered connection, verbatim.
    ///
    /// Returns the IDs evicted because their queue was full or closed.
    pub fn broadcast(&mut self, line: &str) -> Vec<ConnId> {
        self.fan_out(|| Outbound::Line(line.to_string()))
    }

    /// Push the same resync batch to every registered connection.
    pub fn resync_all(&mut self, lines: &[String]) -> Vec<ConnId> {
        self.fan_out(|| Outbound::Resync(lines.to_vec()))
    }

    fn fan_out(&mut self, make: impl Fn() -> Outbound) -> Vec<ConnId> {
        let mut dead = Vec::new();
        for (&id, tx) in self.conns.iter() {
            match tx.try_send(make()) {
                Ok(()) => self.lines_sent += 1,
                Err(TrySendError::Full(_)) => {
                    self.lines_dropped += 1;
                    dead.push(id);
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }
        for id in &dead {
            self.conns.remove(id);
        }
        dead
    }

    pub fn stats(&self) -> RosterStats {
        RosterStats {
            lines_sent: self.lines_sent,
            lines_dropped: self.lines_dropped,
            active_connections: self.conns.len(),
        }
    }
}

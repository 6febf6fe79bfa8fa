//! # scrawl-collab: real-time sync layer for Scrawl
//!
//! Multiple clients edit one shared sketch: every edit goes to a central
//! server, is applied to the master document there, and is relayed verbatim
//! to every participant, the sender included, so all copies converge on
//! identical state in a single global order.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   newline-delimited   ┌────────────┐
//! │ SyncClient │ ◄───────────────────► │ SyncServer │
//! │ (per user) │     text protocol     │ (central)  │
//! └─────┬──────┘                       └─────┬──────┘
//!       │                                    │
//!       ▼                                    ▼
//! ┌────────────┐                      ┌────────────┐
//! │ Document   │                      │ History    │
//! │ (local)    │                      │ (master +  │
//! └────────────┘                      │ snapshots) │
//!                                     └─────┬──────┘
//!                                           │
//!                                     ┌─────┴──────┐
//!                                     │ Roster     │
//!                                     │ (fan-out)  │
//!                                     └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: line grammar: commands, directives, parse errors
//! - [`session`]: shared-secret admission gate (first client sets it)
//! - [`broadcast`]: connection roster and verbatim fan-out
//! - [`server`]: TCP server: master document, bounded undo/redo history
//! - [`client`]: headless client keeping a convergent local copy

pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod server;
pub mod session;

// Re-exports for convenience
pub use broadcast::{ConnId, Outbound, Roster, RosterStats};
pub use client::{ConnectionState, SyncClient, SyncEvent};
pub use protocol::{Command, CommandError, Update};
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use session::{Admission, SessionGate, SessionState};

//! # scrawl-core: shared document model for Scrawl
//!
//! The state every participant agrees on: shapes, the ID-indexed document
//! that orders them, and the bounded snapshot history behind undo/redo.
//! This crate is pure data, no sockets and no async, so the same types back
//! the server's master document and a client's local copy.
//!
//! ## Modules
//!
//! - [`shape`]: the closed shape variant and its canonical text encoding
//! - [`document`]: ordered ID-to-shape container with the two ID counters
//! - [`history`]: bounded window of document snapshots with a cursor

pub mod document;
pub mod history;
pub mod shape;

pub use document::{Document, NO_SHAPE};
pub use history::{History, MAX_SNAPSHOTS};
pub use shape::{Point, Shape, ShapeError};

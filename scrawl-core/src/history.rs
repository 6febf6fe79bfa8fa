//! Bounded undo/redo history over whole-document snapshots.
//!
//! Shapes carry no edit log, so undo granularity is the save point: a deep
//! copy of the active document captured on demand. The window holds at most
//! [`MAX_SNAPSHOTS`] documents; saving beyond that silently evicts the oldest.
//! The document under the cursor is the live one and is mutated in place;
//! everything else in the window is at rest.

use std::collections::VecDeque;

use crate::document::Document;

/// Capacity of the snapshot window.
pub const MAX_SNAPSHOTS: usize = 15;

/// A bounded window of document snapshots with a cursor on the active one.
#[derive(Clone, Debug)]
pub struct History {
    snapshots: VecDeque<Document>,
    current: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// A history holding a single empty document.
    pub fn new() -> Self {
        let mut snapshots = VecDeque::with_capacity(MAX_SNAPSHOTS);
        snapshots.push_back(Document::new());
        Self {
            snapshots,
            current: 0,
        }
    }

    /// The active document.
    pub fn current(&self) -> &Document {
        &self.snapshots[self.current]
    }

    /// The active document, for mutation by command application.
    pub fn current_mut(&mut self) -> &mut Document {
        &mut self.snapshots[self.current]
    }

    /// Capture a save point.
    ///
    /// With the cursor on the last slot of a full window, the oldest snapshot
    /// is evicted and an independent copy of the active document is pushed;
    /// the cursor stays on the last slot, so no document is ever aliased into
    /// two slots. Otherwise every snapshot after the cursor is discarded
    /// (saving after an undo abandons the redo branch), a copy is pushed, and
    /// the cursor advances onto it.
    pub fn save_point(&mut self) {
        if self.current == MAX_SNAPSHOTS - 1 {
            self.snapshots.pop_front();
            if let Some(active) = self.snapshots.back() {
                let copy = active.clone();
                self.snapshots.push_back(copy);
            }
        } else {
            self.snapshots.truncate(self.current + 1);
            let copy = self.current().clone();
            self.snapshots.push_back(copy);
            self.current += 1;
        }
    }

    /// Step the cursor back one save point. False (with a diagnostic) when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        if self.current == 0 {
            log::info!("received undo, but nothing to undo");
            return false;
        }
        self.current -= 1;
        true
    }

    /// Step the cursor forward one save point. False (with a diagnostic)
    /// when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        if self.current + 1 >= self.snapshots.len() {
            log::info!("received redo, but nothing to redo");
            return false;
        }
        self.current += 1;
        true
    }

    /// Number of snapshots currently held.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        false // always holds at least the live document
    }

    /// Cursor position within the window.
    pub fn cursor(&self) -> usize {
        self.current
    }
}

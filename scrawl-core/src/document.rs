//! The ordered, ID-indexed shape container.
//!
//! Shapes are keyed by `i32` IDs and drawn in ascending ID order, so a higher
//! ID means closer to the front. Two counters drive ID assignment: `next_id`
//! grows upward for appends, `floor_id` grows downward for send-to-back
//! reinsertions. They start on opposite sides of zero and diverge, so they
//! can never collide and every live ID stays inside `[floor_id, next_id]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shape::Shape;

/// The "no shape selected" sentinel; always rejected before any other check.
pub const NO_SHAPE: i32 = -1;

/// An ordered mapping from shape ID to shape, with the two ID counters.
///
/// `Clone` is the snapshot operation: point lists are owned vectors, so a
/// clone shares no mutable structure with the original and both counters
/// carry over exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    shapes: BTreeMap<i32, Shape>,
    next_id: i32,
    floor_id: i32,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document. Appends start at 0, send-to-back at -2.
    pub fn new() -> Self {
        Self {
            shapes: BTreeMap::new(),
            next_id: 0,
            floor_id: -2,
        }
    }

    fn valid_id(&self, id: i32) -> bool {
        id != NO_SHAPE && id >= self.floor_id && id <= self.next_id
    }

    /// Append a shape at the next free ID and return the assigned ID.
    /// The counter saturates at the top of the ID range rather than wrapping
    /// below `floor_id`.
    pub fn append(&mut self, shape: Shape) -> i32 {
        let id = self.next_id;
        self.shapes.insert(id, shape);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Remove the shape at `id`. False when the ID is the sentinel, outside
    /// the counter range, or absent.
    pub fn remove(&mut self, id: i32) -> bool {
        if !self.valid_id(id) {
            return false;
        }
        self.shapes.remove(&id).is_some()
    }

    /// Move the shape at `id` by the given displacement.
    pub fn translate(&mut self, id: i32, dx: i32, dy: i32) -> bool {
        if !self.valid_id(id) {
            return false;
        }
        match self.shapes.get_mut(&id) {
            Some(shape) => {
                shape.translate(dx, dy);
                true
            }
            None => false,
        }
    }

    /// Recolor the shape at `id`.
    pub fn recolor(&mut self, id: i32, color: i32) -> bool {
        if !self.valid_id(id) {
            return false;
        }
        match self.shapes.get_mut(&id) {
            Some(shape) => {
                shape.set_color(color);
                true
            }
            None => false,
        }
    }

    /// Upsert a shape at an explicit ID (history replay and client
    /// reconciliation). Keeps `next_id` ahead of externally assigned IDs;
    /// an ID the counter cannot advance past is rejected outright, so the
    /// shape map and the counter never disagree.
    pub fn put(&mut self, id: i32, shape: Shape) -> bool {
        if id == NO_SHAPE {
            return false;
        }
        if id >= self.next_id {
            let Some(next) = id.checked_add(1) else {
                return false;
            };
            self.next_id = next;
        }
        self.shapes.insert(id, shape);
        true
    }

    /// Reinsert the shape at the back of the draw order (lowest ID).
    pub fn send_to_back(&mut self, id: i32) -> bool {
        if !self.valid_id(id) {
            return false;
        }
        let Some(shape) = self.shapes.remove(&id) else {
            return false;
        };
        self.shapes.insert(self.floor_id, shape);
        self.floor_id -= 1;
        true
    }

    /// Reinsert the shape at the front of the draw order (fresh top ID).
    pub fn send_to_front(&mut self, id: i32) -> bool {
        if !self.valid_id(id) {
            return false;
        }
        let Some(shape) = self.shapes.remove(&id) else {
            return false;
        };
        self.append(shape);
        true
    }

    /// The ID of the frontmost shape containing (x, y), if any.
    pub fn topmost_hit(&self, x: i32, y: i32) -> Option<i32> {
        self.shapes
            .iter()
            .rev()
            .find(|(_, shape)| shape.contains(x, y))
            .map(|(id, _)| *id)
    }

    pub fn get(&self, id: i32) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    /// Iterate `(id, shape)` pairs in ascending ID order (back to front).
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Shape)> {
        self.shapes.iter().map(|(id, shape)| (*id, shape))
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn next_id(&self) -> i32 {
        self.next_id
    }

    /// Overwrite the append counter. Clients apply the server's `curId`
    /// directive through this so their local allocator tracks the master's.
    pub fn set_next_id(&mut self, next_id: i32) {
        self.next_id = next_id;
    }

    pub fn floor_id(&self) -> i32 {
        self.floor_id
    }
}

//! Ordered shape store: the z-order of the canvas.
//!
//! ```text
//!  shapes: [ a | b | c | d | e ]      index 0 = back-most
//!  index:  { a→0, b→1, c→2, d→3, e→4 }
//!
//!  change_layer(b, +2): only slots 1..=3 move
//!  shapes: [ a | c | d | b | e ]
//!  index:  { a→0, c→1, d→2, b→3, e→4 }
//! ```
//!
//! Every mutation goes through this type, which keeps the id → position
//! map in lockstep with the array. Layer moves rotate only the slots
//! between the old and the new position, so moving a shape by `k`
//! layers costs O(k) regardless of store size.
//!
//! | Operation        | Cost               |
//! |------------------|--------------------|
//! | `get`            | O(1)               |
//! | `add`            | O(1) amortized     |
//! | `remove`         | O(n)               |
//! | `send_to_front`  | O(n - idx)         |
//! | `send_to_back`   | O(idx)             |
//! | `change_layer`   | O(\|delta\|)       |

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::shape::{Shape, ShapeId};
use crate::Point;

/// Contract violations. Callers must check existence with `get` before
/// asking the store to move a shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Shape not found in store: {0}")]
    UnknownShape(ShapeId),
}

/// Live shapes in back-to-front order with O(1) id lookup.
#[derive(Debug, Clone, Default)]
pub struct OrderedStore {
    shapes: Vec<Shape>,
    index: FxHashMap<ShapeId, usize>,
}

impl OrderedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shapes: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Insert a shape at the front, or replace the shape with the same id
    /// in place (z-order unchanged). Returns the replaced value.
    pub fn add(&mut self, shape: Shape) -> Option<Shape> {
        if let Some(&idx) = self.index.get(&shape.id) {
            return Some(std::mem::replace(&mut self.shapes[idx], shape));
        }
        self.index.insert(shape.id.clone(), self.shapes.len());
        self.shapes.push(shape);
        None
    }

    /// Remove a shape. Absent ids are a no-op and return `None`.
    pub fn remove(&mut self, id: &str) -> Option<Shape> {
        let idx = self.index.remove(id)?;
        let removed = self.shapes.remove(idx);
        for (pos, shape) in self.shapes.iter().enumerate().skip(idx) {
            if let Some(slot) = self.index.get_mut(&shape.id) {
                *slot = pos;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&Shape> {
        self.index.get(id).map(|&idx| &self.shapes[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Current z-position of a shape (0 = back-most).
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Move a shape in front of every other shape.
    pub fn send_to_front(&mut self, id: &str) -> Result<usize, StoreError> {
        let idx = self.position(id)?;
        let last = self.shapes.len() - 1;
        Ok(self.move_up(idx, last))
    }

    /// Move a shape behind every other shape. Every shape that was behind
    /// it has its cached position bumped by one.
    pub fn send_to_back(&mut self, id: &str) -> Result<usize, StoreError> {
        let idx = self.position(id)?;
        Ok(self.move_down(idx, 0))
    }

    /// Move a shape by `delta` layers (positive = towards the front).
    ///
    /// Moves past either end clamp to [`send_to_back`](Self::send_to_back) /
    /// [`send_to_front`](Self::send_to_front). Returns the number of array
    /// slots rewritten, which is at most `|delta| + 1`.
    pub fn change_layer(&mut self, id: &str, delta: i64) -> Result<usize, StoreError> {
        let idx = self.position(id)?;
        let n = self.shapes.len() as i64;
        let target = (idx as i64).saturating_add(delta);

        if target < 0 {
            Ok(self.move_down(idx, 0))
        } else if target >= n {
            Ok(self.move_up(idx, self.shapes.len() - 1))
        } else if delta > 0 {
            Ok(self.move_up(idx, target as usize))
        } else {
            Ok(self.move_down(idx, target as usize))
        }
    }

    fn position(&self, id: &str) -> Result<usize, StoreError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| StoreError::UnknownShape(ShapeId::from(id)))
    }

    /// Rotate `from..=to` left by one: the shape at `from` lands on `to`,
    /// the shapes in between each step back one slot.
    fn move_up(&mut self, from: usize, to: usize) -> usize {
        if from >= to {
            return 0;
        }
        self.shapes[from..=to].rotate_left(1);
        self.reindex(from, to)
    }

    /// Rotate `to..=from` right by one: the shape at `from` lands on `to`,
    /// the shapes in between each step forward one slot.
    fn move_down(&mut self, from: usize, to: usize) -> usize {
        if from <= to {
            return 0;
        }
        self.shapes[to..=from].rotate_right(1);
        self.reindex(to, from)
    }

    fn reindex(&mut self, lo: usize, hi: usize) -> usize {
        for pos in lo..=hi {
            if let Some(slot) = self.index.get_mut(&self.shapes[pos].id) {
                *slot = pos;
            }
        }
        hi - lo + 1
    }

    /// All shapes, back to front. This is the render order.
    pub fn all(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Shape> {
        self.shapes.iter()
    }

    /// Front to back, the order used to resolve pointer input.
    pub fn iter_front_to_back(&self) -> std::iter::Rev<std::slice::Iter<'_, Shape>> {
        self.shapes.iter().rev()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ShapeId> + '_ {
        self.shapes.iter().map(|s| &s.id)
    }

    /// Front-most non-temporary shape under `point`.
    pub fn hit_test(&self, point: Point) -> Option<&Shape> {
        self.iter_front_to_back()
            .find(|shape| !shape.temporary && shape.contains(point))
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
        self.index.clear();
    }

    /// Check that the lookup map covers exactly the stored ids at their
    /// actual positions.
    pub fn verify_index(&self) -> bool {
        self.index.len() == self.shapes.len()
            && self
                .shapes
                .iter()
                .enumerate()
                .all(|(pos, shape)| self.index.get(&shape.id) == Some(&pos))
    }
}

impl<'a> IntoIterator for &'a OrderedStore {
    type Item = &'a Shape;
    type IntoIter = std::slice::Iter<'a, Shape>;

    fn into_iter(self) -> Self::IntoIter {
        self.shapes.iter()
    }
}

//! # easel-core — Shapes, z-order and domain events for a shared canvas
//!
//! Canvas state is a projection over an ordered stream of immutable
//! events. This crate owns the pieces that run inside one session:
//!
//! ```text
//!  local action ──► Event ──► EventBus ──► subscribers (renderer, transport)
//!                     │
//!                     ▼
//!                  Canvas ── OrderedStore (back-to-front)
//!                        └── selections
//! ```
//!
//! ## Modules
//!
//! - [`shape`] — Immutable shape values and their geometry
//! - [`store`] — Ordered store with O(1) lookup and O(k) re-layering
//! - [`event`] — Domain events, origins and layer deltas
//! - [`bus`] — Synchronous in-process publish/subscribe
//! - [`projection`] — Applies events to a store plus selection state

use serde::{Deserialize, Serialize};

pub mod bus;
pub mod event;
pub mod projection;
pub mod shape;
pub mod store;

pub use bus::{Delivery, EventBus, HandlerError, SubscriptionId};
pub use event::{Event, EventPayload, EventType, LayerDelta, Origin, UNBOUNDED};
pub use projection::{Applied, Canvas, Selection};
pub use shape::{Bounds, Geometry, Shape, ShapeId, ShapeKind, ShapePatch};
pub use store::{OrderedStore, StoreError};

/// A position in canvas coordinates.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(b), 5.0);
    }

    #[test]
    fn test_point_wire_shape() {
        let json = serde_json::to_string(&Point::new(1.0, 2.5)).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.5}"#);
    }
}

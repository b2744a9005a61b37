//! Domain events.
//!
//! Every mutation of the canvas is one immutable [`Event`]: an origin
//! tag, a millisecond timestamp and a typed payload. The JSON form is a
//! single flat object with an internally tagged `type` field:
//!
//! ```text
//! {"origin":"5f0c…","timestamp":1718000000000,"type":"EntityLayerChanged",
//!  "id":"rect-5f0c…-3","delta":{"isSentinel":true,"sign":-1}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shape::{Shape, ShapeId, ShapePatch};

/// Layer count that exceeds any realistic store size. A move by this
/// many layers passes every other shape.
pub const UNBOUNDED: i64 = 1 << 40;

/// Per-session identifier used to tag locally produced events.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Fresh random origin for a new session.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Origin {
    fn from(origin: &str) -> Self {
        Self(origin.to_string())
    }
}

/// How far a layer change moves a shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireDelta", into = "WireDelta")]
pub enum LayerDelta {
    /// Signed layer count, positive towards the front. Magnitudes at or
    /// past [`UNBOUNDED`] travel as the matching sentinel.
    By(i64),
    ToBack,
    ToFront,
}

impl LayerDelta {
    /// Normalising constructor: magnitudes at or past [`UNBOUNDED`]
    /// become the matching sentinel.
    pub fn by(steps: i64) -> Self {
        if steps >= UNBOUNDED {
            LayerDelta::ToFront
        } else if steps <= -UNBOUNDED {
            LayerDelta::ToBack
        } else {
            LayerDelta::By(steps)
        }
    }

    /// Signed step count as understood by `OrderedStore::change_layer`.
    pub fn steps(self) -> i64 {
        match self {
            LayerDelta::By(steps) => steps,
            LayerDelta::ToBack => -UNBOUNDED,
            LayerDelta::ToFront => UNBOUNDED,
        }
    }

    pub fn is_sentinel(self) -> bool {
        !matches!(self, LayerDelta::By(_))
    }
}

/// JSON numbers cannot carry the sentinels, so a delta travels as
/// `{isSentinel, sign}` plus an optional `steps` magnitude (default 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDelta {
    pub is_sentinel: bool,
    pub sign: i8,
    #[serde(default = "WireDelta::default_steps", skip_serializing_if = "WireDelta::is_single_step")]
    pub steps: u64,
}

impl WireDelta {
    fn default_steps() -> u64 {
        1
    }

    fn is_single_step(steps: &u64) -> bool {
        *steps == 1
    }
}

impl From<LayerDelta> for WireDelta {
    fn from(delta: LayerDelta) -> Self {
        // `By` built directly may hold a sentinel-sized magnitude.
        match LayerDelta::by(delta.steps()) {
            LayerDelta::ToBack => WireDelta { is_sentinel: true, sign: -1, steps: 1 },
            LayerDelta::ToFront => WireDelta { is_sentinel: true, sign: 1, steps: 1 },
            LayerDelta::By(steps) => WireDelta {
                is_sentinel: false,
                sign: if steps < 0 { -1 } else { 1 },
                steps: steps.unsigned_abs(),
            },
        }
    }
}

impl TryFrom<WireDelta> for LayerDelta {
    type Error = String;

    fn try_from(wire: WireDelta) -> Result<Self, Self::Error> {
        let sign: i64 = match wire.sign {
            1 => 1,
            -1 => -1,
            other => return Err(format!("layer delta sign must be 1 or -1, got {other}")),
        };
        if wire.is_sentinel {
            return Ok(if sign < 0 { LayerDelta::ToBack } else { LayerDelta::ToFront });
        }
        let steps = i64::try_from(wire.steps)
            .map_err(|_| format!("layer delta steps out of range: {}", wire.steps))?;
        Ok(LayerDelta::by(sign * steps))
    }
}

/// Discriminant of an event payload; the key events are routed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    EntityAdded,
    EntityRemoved,
    EntitySelected,
    EntityDeselected,
    EntityUpdated,
    EntityLayerChanged,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::EntityAdded,
        EventType::EntityRemoved,
        EventType::EntitySelected,
        EventType::EntityDeselected,
        EventType::EntityUpdated,
        EventType::EntityLayerChanged,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventType::EntityAdded => "EntityAdded",
            EventType::EntityRemoved => "EntityRemoved",
            EventType::EntitySelected => "EntitySelected",
            EventType::EntityDeselected => "EntityDeselected",
            EventType::EntityUpdated => "EntityUpdated",
            EventType::EntityLayerChanged => "EntityLayerChanged",
        }
    }

    /// Inverse of [`name`](Self::name); unknown names are `None`.
    pub fn from_name(name: &str) -> Option<EventType> {
        EventType::ALL.into_iter().find(|ty| ty.name() == name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type-specific event body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventPayload {
    EntityAdded {
        entity: Shape,
    },
    EntityRemoved {
        id: ShapeId,
    },
    EntitySelected {
        id: ShapeId,
        selection_color: String,
    },
    EntityDeselected {
        id: ShapeId,
    },
    EntityUpdated {
        id: ShapeId,
        #[serde(rename = "partialAttributes")]
        patch: ShapePatch,
    },
    EntityLayerChanged {
        id: ShapeId,
        delta: LayerDelta,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::EntityAdded { .. } => EventType::EntityAdded,
            EventPayload::EntityRemoved { .. } => EventType::EntityRemoved,
            EventPayload::EntitySelected { .. } => EventType::EntitySelected,
            EventPayload::EntityDeselected { .. } => EventType::EntityDeselected,
            EventPayload::EntityUpdated { .. } => EventType::EntityUpdated,
            EventPayload::EntityLayerChanged { .. } => EventType::EntityLayerChanged,
        }
    }

    /// The shape every payload refers to.
    pub fn shape_id(&self) -> &ShapeId {
        match self {
            EventPayload::EntityAdded { entity } => &entity.id,
            EventPayload::EntityRemoved { id }
            | EventPayload::EntitySelected { id, .. }
            | EventPayload::EntityDeselected { id }
            | EventPayload::EntityUpdated { id, .. }
            | EventPayload::EntityLayerChanged { id, .. } => id,
        }
    }

    pub fn added(entity: Shape) -> Self {
        EventPayload::EntityAdded { entity }
    }

    pub fn removed(id: impl Into<ShapeId>) -> Self {
        EventPayload::EntityRemoved { id: id.into() }
    }

    pub fn selected(id: impl Into<ShapeId>, selection_color: impl Into<String>) -> Self {
        EventPayload::EntitySelected {
            id: id.into(),
            selection_color: selection_color.into(),
        }
    }

    pub fn deselected(id: impl Into<ShapeId>) -> Self {
        EventPayload::EntityDeselected { id: id.into() }
    }

    pub fn updated(id: impl Into<ShapeId>, patch: ShapePatch) -> Self {
        EventPayload::EntityUpdated { id: id.into(), patch }
    }

    pub fn layer_changed(id: impl Into<ShapeId>, delta: LayerDelta) -> Self {
        EventPayload::EntityLayerChanged { id: id.into(), delta }
    }
}

/// One immutable domain event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub origin: Origin,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(origin: Origin, timestamp: u64, payload: EventPayload) -> Self {
        Self {
            origin,
            timestamp,
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn shape_id(&self) -> &ShapeId {
        self.payload.shape_id()
    }
}

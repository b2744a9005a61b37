//! Canvas projection: the state obtained by replaying events in order.
//!
//! Concurrent edits from different sessions are last-write-wins. An
//! update or selection that arrives after the shape was removed
//! elsewhere is reported as [`Applied::Absent`] and ignored; a layer
//! change for an unknown shape is a contract violation.

use rustc_hash::FxHashMap;

use crate::event::{Event, EventPayload, LayerDelta, Origin};
use crate::shape::ShapeId;
use crate::store::{OrderedStore, StoreError};

/// Who selected a shape, and the colour their selection is drawn in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub origin: Origin,
    pub color: String,
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The projection changed.
    Changed,
    /// The event named a shape that is not live; nothing changed.
    Absent,
}

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    store: OrderedStore,
    selections: FxHashMap<ShapeId, Selection>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a projection from a log, in order. Contract violations are
    /// logged and the offending event skipped.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut canvas = Self::new();
        for event in events {
            if let Err(e) = canvas.apply(event) {
                log::error!("Replay skipped {} from {}: {e}", event.event_type(), event.origin);
            }
        }
        canvas
    }

    /// Would `apply` accept this event? Nothing is modified.
    pub fn check(&self, event: &Event) -> Result<(), StoreError> {
        match &event.payload {
            EventPayload::EntityLayerChanged { id, .. } if !self.store.contains(id.as_str()) => {
                Err(StoreError::UnknownShape(id.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&mut self, event: &Event) -> Result<Applied, StoreError> {
        match &event.payload {
            EventPayload::EntityAdded { entity } => {
                self.store.add(entity.clone());
                Ok(Applied::Changed)
            }
            EventPayload::EntityRemoved { id } => {
                self.selections.remove(id);
                Ok(changed_if(self.store.remove(id.as_str()).is_some()))
            }
            EventPayload::EntitySelected { id, selection_color } => {
                if !self.store.contains(id.as_str()) {
                    return Ok(Applied::Absent);
                }
                self.selections.insert(
                    id.clone(),
                    Selection {
                        origin: event.origin.clone(),
                        color: selection_color.clone(),
                    },
                );
                Ok(Applied::Changed)
            }
            EventPayload::EntityDeselected { id } => {
                Ok(changed_if(self.selections.remove(id).is_some()))
            }
            EventPayload::EntityUpdated { id, patch } => {
                let Some(current) = self.store.get(id.as_str()) else {
                    return Ok(Applied::Absent);
                };
                let next = current.patched(patch);
                self.store.add(next);
                Ok(Applied::Changed)
            }
            EventPayload::EntityLayerChanged { id, delta } => {
                match delta {
                    LayerDelta::ToBack => self.store.send_to_back(id.as_str())?,
                    LayerDelta::ToFront => self.store.send_to_front(id.as_str())?,
                    LayerDelta::By(steps) => self.store.change_layer(id.as_str(), *steps)?,
                };
                Ok(Applied::Changed)
            }
        }
    }

    pub fn store(&self) -> &OrderedStore {
        &self.store
    }

    pub fn selection(&self, id: &str) -> Option<&Selection> {
        self.selections.get(id)
    }

    /// Shapes currently selected by `origin`.
    pub fn selected_by<'a>(&'a self, origin: &'a Origin) -> impl Iterator<Item = &'a ShapeId> + 'a {
        self.selections
            .iter()
            .filter(move |(_, sel)| &sel.origin == origin)
            .map(|(id, _)| id)
    }

    pub fn selection_count(&self) -> usize {
        self.selections.len()
    }

    /// Same live shapes in the same order with the same values.
    pub fn same_shapes(&self, other: &Canvas) -> bool {
        self.store.all() == other.store.all()
    }
}

fn changed_if(changed: bool) -> Applied {
    if changed {
        Applied::Changed
    } else {
        Applied::Absent
    }
}

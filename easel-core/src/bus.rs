//! Synchronous in-process publish/subscribe, keyed by event type.
//!
//! A bus is an explicit value owned by a session; there is no global
//! instance. Dispatch happens on the caller's thread: `publish` returns
//! only after every matching handler has run, in registration order.
//! A handler that fails (returns `Err` or panics) is logged and skipped;
//! the remaining handlers still receive the event.

use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::event::{Event, EventType};
use crate::store::StoreError;

/// Failure reported by a subscriber.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Store rejected event: {0}")]
    Store(#[from] StoreError),
    #[error("Handler failed: {0}")]
    Failed(String),
}

pub type HandlerResult = Result<(), HandlerError>;

type Handler = Box<dyn FnMut(&Event) -> HandlerResult>;

/// Capability to remove exactly one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

struct Subscriber {
    id: SubscriptionId,
    /// `None` = every event type.
    topic: Option<EventType>,
    handler: Handler,
}

impl Subscriber {
    fn wants(&self, ty: EventType) -> bool {
        self.topic.map_or(true, |topic| topic == ty)
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for one event type.
    pub fn subscribe<F>(&mut self, ty: EventType, handler: F) -> SubscriptionId
    where
        F: FnMut(&Event) -> HandlerResult + 'static,
    {
        self.register(Some(ty), Box::new(handler))
    }

    /// Register `handler` for every event type.
    pub fn subscribe_all<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&Event) -> HandlerResult + 'static,
    {
        self.register(None, Box::new(handler))
    }

    fn register(&mut self, topic: Option<EventType>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber { id, topic, handler });
        id
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Deliver `event` to every subscriber of its type.
    pub fn publish(&mut self, event: &Event) -> Delivery {
        let ty = event.event_type();
        let mut delivery = Delivery::default();

        for sub in self.subscribers.iter_mut().filter(|s| s.wants(ty)) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (sub.handler)(event)));
            match outcome {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    log::error!("Subscriber {:?} failed on {ty} for {}: {e}", sub.id, event.shape_id());
                    delivery.failed += 1;
                }
                Err(_) => {
                    log::error!("Subscriber {:?} panicked on {ty} for {}", sub.id, event.shape_id());
                    delivery.failed += 1;
                }
            }
        }

        log::trace!("Published {ty}: {delivery:?}");
        delivery
    }

    /// Drop every subscription (view teardown).
    pub fn reset(&mut self) {
        self.subscribers.clear();
    }

    /// Number of handlers that would receive an event of type `ty`.
    pub fn subscriber_count(&self, ty: EventType) -> usize {
        self.subscribers.iter().filter(|s| s.wants(ty)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

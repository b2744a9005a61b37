//! Sync session: the event-sourcing layer of one local actor.
//!
//! ```text
//!  commit(payload)                         receive(frame)
//!       │                                        │
//!   tag: origin + timestamp                  decode ──✗──► warn, Rejected
//!       │                                        │
//!   Canvas::apply (optimistic)             origin == ours? ──► SelfEcho
//!       │                                        │
//!   EventBus::publish                       Canvas::apply
//!       │                                        │
//!   encode ──► Transport ──✗──► Outbox     remote activity + EventBus::publish
//! ```
//!
//! Local events are applied the moment they are committed. When the
//! relay echoes them back they are recognised by their origin and not
//! applied a second time. Concurrent edits from different origins are
//! last-write-wins in relay order.

use std::collections::HashMap;

use easel_core::{
    Applied, Canvas, Event, EventBus, EventPayload, Origin, ShapeId, ShapeKind, StoreError,
};
use thiserror::Error;

use crate::protocol::{self, Frame, ProtocolError};
use crate::transport::{Outbox, Transport, TransportError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Frames kept while the transport is disconnected.
    pub outbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn for_testing() -> Self {
        Self { outbox_capacity: 16 }
    }
}

/// What `receive` did with an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A remote event, projected onto the canvas.
    Applied { event: Event, outcome: Applied },
    /// One of our own events coming back from the relay; skipped.
    SelfEcho,
    /// Undecodable frame; logged and dropped.
    Rejected(ProtocolError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub committed: u64,
    pub applied: u64,
    pub echoes: u64,
    pub rejected: u64,
    pub queued: u64,
}

pub struct SyncSession {
    origin: Origin,
    next_shape: u64,
    canvas: Canvas,
    bus: EventBus,
    transport: Box<dyn Transport>,
    outbox: Outbox,
    /// Remote origin → timestamp of its latest applied event.
    remote_activity: HashMap<Origin, u64>,
    stats: SessionStats,
}

impl SyncSession {
    /// Start a session with a freshly generated origin.
    pub fn new(config: SessionConfig, transport: Box<dyn Transport>) -> Self {
        Self::with_origin(Origin::generate(), config, transport)
    }

    pub fn with_origin(origin: Origin, config: SessionConfig, transport: Box<dyn Transport>) -> Self {
        log::info!("Session {origin} started");
        Self {
            origin,
            next_shape: 0,
            canvas: Canvas::new(),
            bus: EventBus::new(),
            transport,
            outbox: Outbox::new(config.outbox_capacity),
            remote_activity: HashMap::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Next locally unique shape id: `<kind-prefix>-<origin>-<counter>`.
    pub fn next_shape_id(&mut self, kind: ShapeKind) -> ShapeId {
        let id = ShapeId::generate(kind, self.origin.as_str(), self.next_shape);
        self.next_shape += 1;
        id
    }

    /// Stamp a payload with this session's origin and the current time.
    pub fn tag(&self, payload: EventPayload) -> Event {
        self.tag_at(payload, now_millis())
    }

    pub fn tag_at(&self, payload: EventPayload, timestamp: u64) -> Event {
        Event::new(self.origin.clone(), timestamp, payload)
    }

    /// Apply a local action and forward it to the relay.
    ///
    /// On `Err` nothing changed: the canvas, the bus, the outbox and the
    /// stats are as they were. That covers contract violations (e.g.
    /// moving an unknown shape) as well as a full outbox or a transport
    /// that refuses the frame.
    pub fn commit(&mut self, payload: EventPayload) -> Result<Event, SessionError> {
        let event = self.tag(payload);
        self.commit_event(event)
    }

    /// Commit an already tagged event. It must carry this session's origin.
    pub fn commit_event(&mut self, event: Event) -> Result<Event, SessionError> {
        debug_assert_eq!(event.origin, self.origin);

        self.canvas.check(&event)?;
        let frame = protocol::encode(&event)?;
        self.send(frame)?;

        // Sent or queued: the projection must follow.
        self.canvas.apply(&event)?;
        self.bus.publish(&event);
        self.stats.committed += 1;
        log::debug!("Committed {} for {}", event.event_type(), event.shape_id());
        Ok(event)
    }

    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        // Anything already queued must go first to keep our events in order.
        if !self.outbox.is_empty() {
            return self.queue(frame);
        }
        match self.transport.send(&self.origin, frame.clone()) {
            Err(TransportError::Disconnected) => self.queue(frame),
            other => other,
        }
    }

    fn queue(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.outbox.enqueue(frame) {
            return Err(TransportError::OutboxFull {
                capacity: self.outbox.capacity(),
            });
        }
        self.stats.queued += 1;
        Ok(())
    }

    /// Retry queued frames, in order. Returns how many were sent.
    pub fn flush_outbox(&mut self) -> Result<usize, SessionError> {
        if self.outbox.is_empty() {
            return Ok(0);
        }
        let sent = self.outbox.flush_into(&self.origin, self.transport.as_mut())?;
        log::info!("Session {} replayed {sent} queued frames", self.origin);
        Ok(sent)
    }

    /// Swap in a new transport (reconnect) and replay the outbox into it.
    pub fn reconnect(&mut self, transport: Box<dyn Transport>) -> Result<usize, SessionError> {
        self.transport = transport;
        self.flush_outbox()
    }

    /// Handle one inbound frame from the relay.
    ///
    /// Decode failures are not errors for the session: the frame is
    /// logged and dropped so the rest of the stream keeps flowing.
    pub fn receive(&mut self, frame: &[u8]) -> Result<Inbound, SessionError> {
        let event = match protocol::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Session {} dropped undecodable frame: {e}", self.origin);
                self.stats.rejected += 1;
                return Ok(Inbound::Rejected(e));
            }
        };
        self.apply_inbound(event)
    }

    /// Project a decoded inbound event unless it is our own echo.
    pub fn apply_inbound(&mut self, event: Event) -> Result<Inbound, SessionError> {
        if event.origin == self.origin {
            self.stats.echoes += 1;
            log::trace!("Skipped self-echo {} for {}", event.event_type(), event.shape_id());
            return Ok(Inbound::SelfEcho);
        }

        let outcome = self.canvas.apply(&event).map_err(|e| {
            log::error!(
                "Inbound {} from {} violates store contract: {e}",
                event.event_type(),
                event.origin
            );
            e
        })?;

        self.remote_activity
            .insert(event.origin.clone(), event.timestamp);
        self.bus.publish(&event);
        self.stats.applied += 1;
        Ok(Inbound::Applied { event, outcome })
    }

    /// Feed a batch of frames (e.g. the relay's initial state) through
    /// `receive`. Contract violations are logged and skipped.
    pub fn receive_all<I, F>(&mut self, frames: I) -> usize
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut applied = 0;
        for frame in frames {
            if let Ok(Inbound::Applied { .. }) = self.receive(frame.as_ref()) {
                applied += 1;
            }
        }
        applied
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Remote origins seen so far with the timestamp of their latest event.
    pub fn remote_activity(&self) -> &HashMap<Origin, u64> {
        &self.remote_activity
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbox.len()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("origin", &self.origin)
            .field("shapes", &self.canvas.store().len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

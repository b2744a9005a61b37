//! In-process relay room.
//!
//! One room totally orders the frames of every participant and fans
//! them out through a tokio broadcast channel:
//!
//! ```text
//!  session A ──send──┐                     ┌──► RelayLink A (echo)
//!                    ▼                     │
//!               RelayRoom::submit ──► broadcast::Sender ──► RelayLink B
//!                    │                     │
//!  session B ──send──┘                     └──► RelayLink C
//!                    │
//!                    ├──► history (backlog for late joiners)
//!                    └──► EventLogFile (temporary shapes skipped)
//! ```
//!
//! The sender receives its own frame back; suppressing the echo is the
//! session's job. A link that falls more than `broadcast_capacity`
//! frames behind is refilled from the history, so every link sees every
//! frame exactly once, in relay order. When a participant leaves, the room deselects every
//! shape it still had selected on its behalf.
//!
//! Performance target: 1,000 frames to 100 links < 10ms

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use easel_core::{Event, EventPayload, Origin, ShapeId};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use crate::protocol::{self, Frame, ProtocolError};
use crate::session::now_millis;
use crate::storage::{EventLogFile, LogError};
use crate::transport::{Transport, TransportError};

/// Relay room configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Frames buffered per link before a slow reader starts lagging.
    pub broadcast_capacity: usize,
    /// Event log to restore from and append to. `None` keeps the room
    /// in memory only.
    pub log_path: Option<PathBuf>,
    /// Persist temporary shapes as well.
    pub persist_temporary: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            log_path: None,
            persist_temporary: false,
        }
    }
}

impl RelayConfig {
    pub fn for_testing() -> Self {
        Self {
            broadcast_capacity: 64,
            ..Self::default()
        }
    }

    pub fn with_log(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: Some(path.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("Origin {0} has not joined the room")]
    NotJoined(Origin),
    #[error("Frame claims origin {claimed} but was sent by {sender}")]
    OriginMismatch { sender: Origin, claimed: Origin },
    #[error("Relay room state poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub frames_relayed: u64,
    pub frames_rejected: u64,
    pub participants: usize,
    pub history_len: usize,
}

struct AtomicRelayStats {
    frames_relayed: AtomicU64,
    frames_rejected: AtomicU64,
}

struct RoomState {
    history: Vec<Arc<Frame>>,
    participants: HashSet<Origin>,
    /// Shapes each participant currently has selected.
    selections: HashMap<Origin, BTreeSet<ShapeId>>,
    /// Live temporary shapes, never written to the log.
    temp_shapes: HashSet<ShapeId>,
    log: Option<EventLogFile>,
}

pub struct RelayRoom {
    config: RelayConfig,
    state: Mutex<RoomState>,
    sender: broadcast::Sender<Arc<Frame>>,
    stats: AtomicRelayStats,
}

impl RelayRoom {
    /// Create a room. With a `log_path`, events already in the log
    /// become the initial history.
    pub fn new(config: RelayConfig) -> Result<Arc<Self>, RelayError> {
        let mut history = Vec::new();
        let log = match &config.log_path {
            Some(path) => {
                if path.exists() {
                    let loaded = EventLogFile::load(path)?;
                    for event in &loaded.events {
                        history.push(Arc::new(protocol::encode(event)?));
                    }
                    log::info!("Restored {} events into relay room", history.len());
                }
                Some(EventLogFile::open(path)?)
            }
            None => None,
        };

        Ok(Self::build(config, history, log))
    }

    /// Room with default settings and no log.
    pub fn in_memory() -> Arc<Self> {
        Self::build(RelayConfig::default(), Vec::new(), None)
    }

    fn build(config: RelayConfig, history: Vec<Arc<Frame>>, log: Option<EventLogFile>) -> Arc<Self> {
        let (sender, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Arc::new(Self {
            config,
            state: Mutex::new(RoomState {
                history,
                participants: HashSet::new(),
                selections: HashMap::new(),
                temp_shapes: HashSet::new(),
                log,
            }),
            sender,
            stats: AtomicRelayStats {
                frames_relayed: AtomicU64::new(0),
                frames_rejected: AtomicU64::new(0),
            },
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, RoomState>, RelayError> {
        self.state.lock().map_err(|_| RelayError::Poisoned)
    }

    /// Join the room. The link starts with the full history as its
    /// backlog, then receives every frame relayed after the join.
    pub fn join(self: &Arc<Self>, origin: Origin) -> Result<RelayLink, RelayError> {
        let mut state = self.lock()?;
        // Subscribing under the lock: no frame falls between backlog and receiver.
        let receiver = self.sender.subscribe();
        let backlog: VecDeque<Arc<Frame>> = state.history.iter().cloned().collect();
        state.participants.insert(origin.clone());
        log::info!(
            "{origin} joined relay room ({} participants, {} backlog frames)",
            state.participants.len(),
            backlog.len()
        );

        Ok(RelayLink {
            origin,
            room: Arc::clone(self),
            cursor: backlog.len(),
            backlog,
            receiver,
            lagged: 0,
        })
    }

    /// History from index `from` onwards plus a fresh receiver positioned
    /// right after it.
    fn catch_up(
        &self,
        from: usize,
    ) -> Result<(Vec<Arc<Frame>>, broadcast::Receiver<Arc<Frame>>), RelayError> {
        let state = self.lock()?;
        let receiver = self.sender.subscribe();
        let missed = state.history.get(from..).unwrap_or_default().to_vec();
        Ok((missed, receiver))
    }

    /// Relay one frame from `sender`. Returns the number of links it
    /// was delivered to.
    pub fn submit(&self, sender: &Origin, frame: Frame) -> Result<usize, RelayError> {
        let event = match protocol::decode(&frame) {
            Ok(event) => event,
            Err(e) => {
                self.stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("Relay dropped undecodable frame from {sender}: {e}");
                return Err(e.into());
            }
        };
        if &event.origin != sender {
            self.stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
            log::warn!("Relay dropped frame from {sender} tagged with {}", event.origin);
            return Err(RelayError::OriginMismatch {
                sender: sender.clone(),
                claimed: event.origin,
            });
        }

        let mut state = self.lock()?;
        if !state.participants.contains(sender) {
            return Err(RelayError::NotJoined(sender.clone()));
        }

        track_selection(&mut state, &event);
        let persist = self.should_persist(&mut state, &event);
        Ok(self.relay_locked(&mut state, frame, persist))
    }

    /// Remove `origin` from the room and deselect, on its behalf, every
    /// shape it still had selected. Returns the number of deselections.
    pub fn leave(&self, origin: &Origin) -> Result<usize, RelayError> {
        let mut state = self.lock()?;
        if !state.participants.remove(origin) {
            return Ok(0);
        }

        let selected = state.selections.remove(origin).unwrap_or_default();
        for id in &selected {
            let event = Event::new(origin.clone(), now_millis(), EventPayload::deselected(id.clone()));
            let frame = protocol::encode(&event)?;
            self.relay_locked(&mut state, frame, true);
        }

        log::info!(
            "{origin} left relay room ({} deselected, {} participants)",
            selected.len(),
            state.participants.len()
        );
        Ok(selected.len())
    }

    fn should_persist(&self, state: &mut RoomState, event: &Event) -> bool {
        if self.config.persist_temporary {
            return true;
        }
        match &event.payload {
            EventPayload::EntityAdded { entity } if entity.temporary => {
                state.temp_shapes.insert(entity.id.clone());
                false
            }
            EventPayload::EntityRemoved { id } => !state.temp_shapes.remove(id),
            _ => true,
        }
    }

    fn relay_locked(&self, state: &mut RoomState, frame: Frame, persist: bool) -> usize {
        if persist {
            if let Some(log) = state.log.as_mut() {
                if let Err(e) = log.append_frame(&frame) {
                    log::error!("Failed to persist relayed frame: {e}");
                }
            }
        }

        let frame = Arc::new(frame);
        state.history.push(Arc::clone(&frame));
        self.stats.frames_relayed.fetch_add(1, Ordering::Relaxed);
        // No receivers is not an error; the frame is still in history.
        self.sender.send(frame).unwrap_or(0)
    }

    /// Every frame relayed so far (including restored history).
    pub fn history(&self) -> Result<Vec<Arc<Frame>>, RelayError> {
        Ok(self.lock()?.history.clone())
    }

    pub fn participants(&self) -> Result<Vec<Origin>, RelayError> {
        let mut origins: Vec<Origin> = self.lock()?.participants.iter().cloned().collect();
        origins.sort();
        Ok(origins)
    }

    /// Shapes `origin` currently has selected, in id order.
    pub fn selected_by(&self, origin: &Origin) -> Result<Vec<ShapeId>, RelayError> {
        Ok(self
            .lock()?
            .selections
            .get(origin)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn stats(&self) -> Result<RelayStats, RelayError> {
        let state = self.lock()?;
        Ok(RelayStats {
            frames_relayed: self.stats.frames_relayed.load(Ordering::Relaxed),
            frames_rejected: self.stats.frames_rejected.load(Ordering::Relaxed),
            participants: state.participants.len(),
            history_len: state.history.len(),
        })
    }
}

fn track_selection(state: &mut RoomState, event: &Event) {
    match &event.payload {
        EventPayload::EntitySelected { id, .. } => {
            state
                .selections
                .entry(event.origin.clone())
                .or_default()
                .insert(id.clone());
        }
        EventPayload::EntityDeselected { id } => {
            if let Some(ids) = state.selections.get_mut(&event.origin) {
                ids.remove(id);
            }
        }
        EventPayload::EntityRemoved { id } => {
            for ids in state.selections.values_mut() {
                ids.remove(id);
            }
        }
        _ => {}
    }
}

/// One participant's connection to a [`RelayRoom`].
pub struct RelayLink {
    origin: Origin,
    room: Arc<RelayRoom>,
    backlog: VecDeque<Arc<Frame>>,
    receiver: broadcast::Receiver<Arc<Frame>>,
    /// History index of the next frame `receiver` yields.
    cursor: usize,
    lagged: u64,
}

impl RelayLink {
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Drain every frame available right now: the join backlog first,
    /// then live frames in relay order.
    pub fn poll(&mut self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.backlog.drain(..).map(Arc::unwrap_or_clone).collect();
        loop {
            match self.receiver.try_recv() {
                Ok(frame) => {
                    self.cursor += 1;
                    frames.push(Arc::unwrap_or_clone(frame));
                }
                Err(TryRecvError::Lagged(n)) => {
                    self.lagged += n;
                    match self.room.catch_up(self.cursor) {
                        Ok((missed, receiver)) => {
                            log::warn!(
                                "Relay link {} lagged by {n} frames, refilled {} from history",
                                self.origin,
                                missed.len()
                            );
                            self.cursor += missed.len();
                            self.receiver = receiver;
                            frames.extend(missed.into_iter().map(Arc::unwrap_or_clone));
                        }
                        Err(e) => {
                            log::error!("Relay link {} lagged and cannot catch up: {e}", self.origin);
                            break;
                        }
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        frames
    }

    /// Frames that overflowed this link's channel and were refilled from
    /// the room history.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    pub fn room(&self) -> &Arc<RelayRoom> {
        &self.room
    }

    /// Sending half for a session, so the link itself stays free for
    /// polling.
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            room: Arc::clone(&self.room),
        }
    }

    /// Leave the room. Returns the number of shapes deselected.
    pub fn leave(self) -> Result<usize, RelayError> {
        self.room.leave(&self.origin)
    }
}

impl Transport for RelayLink {
    fn send(&mut self, origin: &Origin, frame: Frame) -> Result<(), TransportError> {
        submit_as_transport(&self.room, origin, frame)
    }
}

/// Send-only access to a room.
#[derive(Clone)]
pub struct RelayHandle {
    room: Arc<RelayRoom>,
}

impl Transport for RelayHandle {
    fn send(&mut self, origin: &Origin, frame: Frame) -> Result<(), TransportError> {
        submit_as_transport(&self.room, origin, frame)
    }
}

fn submit_as_transport(room: &RelayRoom, origin: &Origin, frame: Frame) -> Result<(), TransportError> {
    match room.submit(origin, frame) {
        Ok(_) => Ok(()),
        Err(RelayError::NotJoined(_)) | Err(RelayError::Poisoned) => Err(TransportError::Disconnected),
        Err(e) => Err(TransportError::Rejected(e.to_string())),
    }
}

impl std::fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLink")
            .field("origin", &self.origin)
            .field("backlog", &self.backlog.len())
            .field("lagged", &self.lagged)
            .finish()
    }
}

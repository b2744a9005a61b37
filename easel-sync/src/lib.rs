//! # easel-sync — Event synchronization layer for Easel
//!
//! Turns local canvas edits into origin-tagged events, ships them
//! through a relay that agrees on one order for everybody, and projects
//! what comes back onto each participant's canvas.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   JSON frames   ┌─────────────┐   JSON frames   ┌─────────────┐
//! │ SyncSession │ ──────────────► │  RelayRoom  │ ──────────────► │ SyncSession │
//! │ (alice)     │ ◄────────────── │  (ordering) │ ◄────────────── │ (bob)       │
//! └──────┬──────┘     echo        └──────┬──────┘                 └──────┬──────┘
//!        │                               │                               │
//!        ▼                               ▼                               ▼
//! ┌─────────────┐                 ┌─────────────┐                 ┌─────────────┐
//! │ Canvas      │                 │ EventLogFile│                 │ Canvas      │
//! │ (optimistic)│                 │ (NDJSON)    │                 │ (replica)   │
//! └─────────────┘                 └──────┬──────┘                 └─────────────┘
//!                                        │
//!                                 ┌──────┴──────┐
//!                                 │ LogCompactor│
//!                                 └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire codec for events
//! - [`transport`] — Transport seam and offline outbox
//! - [`session`] — Event-sourcing layer with self-echo suppression
//! - [`relay`] — In-process relay room (tokio broadcast fan-out)
//! - [`storage`] — Event log files and compaction
//!
//! ## Performance Targets
//!
//! | Metric | Target |
//! |--------|--------|
//! | Event encode + decode | <5μs |
//! | Relay 1K frames × 100 links | <10ms |
//! | Compact 10K-event log | <5ms |

pub mod protocol;
pub mod relay;
pub mod session;
pub mod storage;
pub mod transport;

// Re-exports for convenience
pub use protocol::{Frame, ProtocolError};
pub use relay::{RelayConfig, RelayError, RelayHandle, RelayLink, RelayRoom, RelayStats};
pub use session::{Inbound, SessionConfig, SessionError, SessionStats, SyncSession};
pub use storage::{
    CompactedFrames, Compacted, CompactionStats, EventLogFile, LoadedLog, LogCompactor, LogError,
    RejectedLine,
};
pub use transport::{Outbox, Transport, TransportError};

//! Persistent storage for canvas histories.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   append(event)   ┌────────────────────────────┐
//! │ RelayRoom   │ ────────────────► │ EventLogFile (NDJSON)      │
//! └─────────────┘                   │  {"type":"EntityAdded",…}  │
//!                                   │  {"type":"EntityRemoved",…}│
//!                                   └─────────────┬──────────────┘
//!                                                 │ load (top → bottom)
//!                     ┌───────────────────────────┴───────────┐
//!                     ▼                                       ▼
//!              Canvas::replay                     LogCompactor (bottom → top)
//!                                                             │
//!                                                  write_all (temp + rename)
//! ```
//!
//! One event per line. A line that does not decode is skipped and
//! reported; it never stops the rest of the log from loading.

pub mod compaction;
pub mod event_log;

pub use compaction::{CompactedFrames, Compacted, CompactionStats, LogCompactor};
pub use event_log::{EventLogFile, LoadedLog, LogError, RejectedLine};

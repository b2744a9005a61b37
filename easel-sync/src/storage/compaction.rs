//! Log compaction.
//!
//! ```text
//!  original:  Added(x) Added(y) Selected(x) Removed(x) Selected(y)
//!  scan ◄──────────────────────────────────────────────────────────
//!             drop     keep     drop        dead{x}    keep
//!  compacted: Added(y) Selected(y)
//! ```
//!
//! The log is scanned newest first. A removal marks its shape dead and
//! is dropped, as is every older event that names a dead shape. The
//! survivors are emitted in their original order. Compacted logs hold
//! no removals, so compacting twice changes nothing.
//!
//! Replaying the compacted log gives the same live shapes as replaying
//! the original. Relative layer moves are counted in slots, so a
//! `By(d)` move that crossed a shape which is later removed can land
//! differently once that shape's history is gone; sentinel moves are
//! unaffected.

use std::collections::HashSet;
use std::path::Path;

use easel_core::{Event, EventPayload, ShapeId};

use super::event_log::{is_blank, EventLogFile, LogError};
use crate::protocol::{self, Frame};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub input: usize,
    pub output: usize,
    /// Distinct shapes whose history was dropped.
    pub dead_shapes: usize,
    /// Lines that did not decode (frame compaction only).
    pub rejected: usize,
}

impl CompactionStats {
    pub fn dropped(&self) -> usize {
        self.input - self.output - self.rejected
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compacted {
    pub events: Vec<Event>,
    pub stats: CompactionStats,
}

/// Compaction over raw lines; kept lines are returned verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedFrames {
    pub frames: Vec<Frame>,
    pub stats: CompactionStats,
}

pub struct LogCompactor;

impl LogCompactor {
    pub fn compact(events: &[Event]) -> Compacted {
        let keep = Self::survivors(events.iter());
        let kept: Vec<Event> = events
            .iter()
            .zip(&keep.flags)
            .filter(|(_, keep)| **keep)
            .map(|(event, _)| event.clone())
            .collect();

        let stats = CompactionStats {
            input: events.len(),
            output: kept.len(),
            dead_shapes: keep.dead_shapes,
            rejected: 0,
        };
        log::debug!("Compacted {} events to {}", stats.input, stats.output);
        Compacted { events: kept, stats }
    }

    /// Compact pre-encoded lines. Undecodable lines are logged and
    /// dropped; blank lines are ignored.
    pub fn compact_frames<S: AsRef<[u8]>>(lines: &[S]) -> CompactedFrames {
        let mut decoded = Vec::with_capacity(lines.len());
        let mut rejected = 0;
        for line in lines {
            let line = line.as_ref();
            if is_blank(line) {
                continue;
            }
            match protocol::decode(line) {
                Ok(event) => decoded.push((line, event)),
                Err(e) => {
                    log::warn!("Compaction dropped undecodable line: {e}");
                    rejected += 1;
                }
            }
        }

        let keep = Self::survivors(decoded.iter().map(|(_, event)| event));
        let frames: Vec<Frame> = decoded
            .iter()
            .zip(&keep.flags)
            .filter(|(_, keep)| **keep)
            .map(|((line, _), _)| line.to_vec())
            .collect();

        let stats = CompactionStats {
            input: decoded.len() + rejected,
            output: frames.len(),
            dead_shapes: keep.dead_shapes,
            rejected,
        };
        CompactedFrames { frames, stats }
    }

    /// Compact the log at `input` into `output` (which may be the same
    /// path; the rewrite is atomic).
    pub fn compact_file(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<CompactionStats, LogError> {
        let lines = EventLogFile::read_lines(&input)?;
        let compacted = Self::compact_frames(&lines);
        EventLogFile::write_lines(&output, &compacted.frames)?;

        let stats = compacted.stats;
        log::info!(
            "Compacted {}: {} → {} events, {} dead shapes, {} rejected",
            input.as_ref().display(),
            stats.input,
            stats.output,
            stats.dead_shapes,
            stats.rejected
        );
        Ok(stats)
    }

    /// Backward pass: one keep flag per event, in input order.
    fn survivors<'a, I>(events: I) -> Survivors
    where
        I: DoubleEndedIterator<Item = &'a Event> + ExactSizeIterator,
    {
        let mut flags = vec![false; events.len()];
        let mut dead: HashSet<&ShapeId> = HashSet::new();

        for (slot, event) in flags.iter_mut().rev().zip(events.rev()) {
            if let EventPayload::EntityRemoved { id } = &event.payload {
                dead.insert(id);
                continue;
            }
            *slot = !dead.contains(event.shape_id());
        }

        Survivors {
            flags,
            dead_shapes: dead.len(),
        }
    }
}

struct Survivors {
    flags: Vec<bool>,
    dead_shapes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Canvas, EventType, LayerDelta, Origin, Point, Shape, ShapePatch};
    use proptest::prelude::*;

    fn ev(payload: EventPayload) -> Event {
        Event::new(Origin::from("alice"), 0, payload)
    }

    fn rect(id: &str) -> Shape {
        Shape::rectangle(id, Point::new(0.0, 0.0), Point::new(2.0, 2.0))
    }

    fn kinds(events: &[Event]) -> Vec<(EventType, String)> {
        events
            .iter()
            .map(|e| (e.event_type(), e.shape_id().to_string()))
            .collect()
    }

    #[test]
    fn test_removed_shape_history_vanishes() {
        let log = vec![
            ev(EventPayload::added(rect("x"))),
            ev(EventPayload::added(rect("y"))),
            ev(EventPayload::removed("x")),
            ev(EventPayload::selected("y", "#0f0")),
        ];
        let compacted = LogCompactor::compact(&log);
        assert_eq!(
            kinds(&compacted.events),
            vec![
                (EventType::EntityAdded, "y".to_string()),
                (EventType::EntitySelected, "y".to_string()),
            ]
        );
        assert_eq!(compacted.stats.input, 4);
        assert_eq!(compacted.stats.output, 2);
        assert_eq!(compacted.stats.dead_shapes, 1);
        assert_eq!(compacted.stats.dropped(), 2);
    }

    #[test]
    fn test_every_event_kind_of_dead_shape_dropped() {
        let log = vec![
            ev(EventPayload::added(rect("x"))),
            ev(EventPayload::selected("x", "red")),
            ev(EventPayload::updated("x", ShapePatch::default())),
            ev(EventPayload::layer_changed("x", LayerDelta::ToFront)),
            ev(EventPayload::deselected("x")),
            ev(EventPayload::removed("x")),
        ];
        assert!(LogCompactor::compact(&log).events.is_empty());
    }

    #[test]
    fn test_readded_shape_keeps_later_history() {
        let log = vec![
            ev(EventPayload::added(rect("x"))),
            ev(EventPayload::removed("x")),
            ev(EventPayload::added(rect("x").with_colors("red", "blue"))),
            ev(EventPayload::selected("x", "#fff")),
        ];
        let compacted = LogCompactor::compact(&log);
        assert_eq!(compacted.events, log[2..].to_vec());
        assert!(Canvas::replay(&compacted.events).same_shapes(&Canvas::replay(&log)));
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let log = vec![
            ev(EventPayload::added(rect("a"))),
            ev(EventPayload::added(rect("b"))),
            ev(EventPayload::layer_changed("a", LayerDelta::ToFront)),
            ev(EventPayload::removed("b")),
            ev(EventPayload::added(rect("c"))),
        ];
        let once = LogCompactor::compact(&log).events;
        let twice = LogCompactor::compact(&once);
        assert_eq!(twice.events, once);
        assert_eq!(twice.stats.dead_shapes, 0);
    }

    #[test]
    fn test_empty_log() {
        let compacted = LogCompactor::compact(&[]);
        assert!(compacted.events.is_empty());
        assert_eq!(compacted.stats, CompactionStats::default());
    }

    #[test]
    fn test_compact_frames_keeps_lines_verbatim() {
        let added = protocol::encode(&ev(EventPayload::added(rect("y")))).unwrap();
        let lines = vec![
            protocol::encode(&ev(EventPayload::added(rect("x")))).unwrap(),
            added.clone(),
            b"garbage".to_vec(),
            b"{\"type\":\"EntityRemoved\",\"id\":\"\xE2\x82".to_vec(),
            Vec::new(),
            protocol::encode(&ev(EventPayload::removed("x"))).unwrap(),
        ];
        let compacted = LogCompactor::compact_frames(&lines);
        assert_eq!(compacted.frames, vec![added]);
        assert_eq!(compacted.stats.input, 5);
        assert_eq!(compacted.stats.rejected, 2);
        assert_eq!(compacted.stats.output, 1);
    }

    #[test]
    fn test_compact_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.ndjson");
        let log = vec![
            ev(EventPayload::added(rect("x"))),
            ev(EventPayload::added(rect("y"))),
            ev(EventPayload::removed("x")),
        ];
        EventLogFile::write_all(&path, &log).unwrap();

        let stats = LogCompactor::compact_file(&path, &path).unwrap();
        assert_eq!(stats.output, 1);
        let reloaded = EventLogFile::load(&path).unwrap();
        assert_eq!(reloaded.events, vec![log[1].clone()]);
    }

    #[test]
    fn test_compact_file_survives_invalid_utf8_line() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("canvas.ndjson");
        let output = dir.path().join("compacted.ndjson");

        let mut log = EventLogFile::open(&input).unwrap();
        log.append(&ev(EventPayload::added(rect("x")))).unwrap();
        log.append_frame(b"{\"type\":\"EntitySelected\",\"selectionColor\":\"\xC3").unwrap();
        log.append(&ev(EventPayload::added(rect("y")))).unwrap();
        drop(log);

        let stats = LogCompactor::compact_file(&input, &output).unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.output, 2);
        let reloaded = EventLogFile::load(&output).unwrap();
        assert!(reloaded.rejected.is_empty());
        assert_eq!(reloaded.events.len(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize),
        Remove(usize),
        Select(usize),
        Deselect(usize),
        Recolor(usize),
        ToFront(usize),
        ToBack(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let id = 0..6usize;
        prop_oneof![
            3 => id.clone().prop_map(Op::Add),
            1 => id.clone().prop_map(Op::Remove),
            1 => id.clone().prop_map(Op::Select),
            1 => id.clone().prop_map(Op::Deselect),
            1 => id.clone().prop_map(Op::Recolor),
            1 => id.clone().prop_map(Op::ToFront),
            1 => id.prop_map(Op::ToBack),
        ]
    }

    /// Builds a log that only moves shapes which exist, so every event
    /// is valid when replayed.
    fn build_log(ops: &[Op]) -> Vec<Event> {
        let mut live = HashSet::new();
        let mut log = Vec::new();
        for op in ops {
            let payload = match *op {
                Op::Add(n) => {
                    live.insert(n);
                    EventPayload::added(rect(&format!("s{n}")))
                }
                Op::Remove(n) => {
                    live.remove(&n);
                    EventPayload::removed(format!("s{n}"))
                }
                Op::Select(n) => EventPayload::selected(format!("s{n}"), "#abc"),
                Op::Deselect(n) => EventPayload::deselected(format!("s{n}")),
                Op::Recolor(n) => EventPayload::updated(
                    format!("s{n}"),
                    ShapePatch {
                        fill_color: Some(format!("#{n}{n}{n}")),
                        ..ShapePatch::default()
                    },
                ),
                Op::ToFront(n) if live.contains(&n) => {
                    EventPayload::layer_changed(format!("s{n}"), LayerDelta::ToFront)
                }
                Op::ToBack(n) if live.contains(&n) => {
                    EventPayload::layer_changed(format!("s{n}"), LayerDelta::ToBack)
                }
                Op::ToFront(_) | Op::ToBack(_) => continue,
            };
            log.push(ev(payload));
        }
        log
    }

    proptest! {
        #[test]
        fn prop_compacted_replay_matches(ops in prop::collection::vec(op_strategy(), 0..60)) {
            let log = build_log(&ops);
            let original = Canvas::replay(&log);
            let compacted = LogCompactor::compact(&log);
            let replayed = Canvas::replay(&compacted.events);

            prop_assert!(replayed.same_shapes(&original));
            for shape in original.store() {
                prop_assert_eq!(
                    replayed.selection(shape.id.as_str()),
                    original.selection(shape.id.as_str())
                );
            }
            prop_assert_eq!(LogCompactor::compact(&compacted.events).events, compacted.events);
        }
    }
}

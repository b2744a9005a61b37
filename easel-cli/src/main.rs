//! `easel` — offline tools for recorded canvas event logs.
//!
//! ```text
//! easel compact canvas.ndjson -o canvas.compact.ndjson
//! easel replay  canvas.ndjson
//! easel inspect canvas.ndjson
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use easel_core::{Canvas, EventType};
use easel_sync::{EventLogFile, LoadedLog, LogCompactor};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "easel")]
#[command(about = "Inspect, replay and compact Easel canvas event logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop the history of removed shapes from a log.
    Compact {
        /// Event log to read.
        input: PathBuf,

        /// Where to write the compacted log (defaults to rewriting the input in place).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Replay a log and print the final shapes, back to front.
    Replay {
        input: PathBuf,
    },
    /// Summarize a log: events per kind, origins, undecodable lines.
    Inspect {
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Compact { input, output } => compact(&input, output.as_deref()),
        Commands::Replay { input } => replay(&input),
        Commands::Inspect { input } => inspect(&input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn compact(input: &Path, output: Option<&Path>) -> CliResult<()> {
    let output = output.unwrap_or(input);
    let stats = LogCompactor::compact_file(input, output)?;
    println!(
        "{} → {}: {} events in, {} out, {} dead shapes, {} undecodable lines dropped",
        input.display(),
        output.display(),
        stats.input,
        stats.output,
        stats.dead_shapes,
        stats.rejected
    );
    Ok(())
}

fn replay(input: &Path) -> CliResult<()> {
    let loaded = EventLogFile::load(input)?;
    let canvas = Canvas::replay(&loaded.events);
    for line in render_order(&canvas) {
        println!("{line}");
    }
    println!("{} shapes", canvas.store().len());
    Ok(())
}

/// One line per live shape, back-most first.
fn render_order(canvas: &Canvas) -> Vec<String> {
    canvas
        .store()
        .iter()
        .enumerate()
        .map(|(layer, shape)| {
            let mut line = format!("{layer:>4}  {:<9} {}", shape.kind(), shape.id);
            if let Some(selection) = canvas.selection(shape.id.as_str()) {
                line.push_str(&format!("  [selected by {}]", selection.origin));
            }
            if shape.temporary {
                line.push_str("  (temporary)");
            }
            line
        })
        .collect()
}

fn inspect(input: &Path) -> CliResult<()> {
    let loaded = EventLogFile::load(input)?;
    let summary = Summary::of(&loaded);

    println!("{}", input.display());
    println!("  events:   {}", summary.events);
    for (kind, count) in &summary.per_kind {
        println!("    {kind:<20} {count}");
    }
    println!("  origins:  {}", summary.origins.len());
    for origin in &summary.origins {
        println!("    {origin}");
    }
    if let Some((first, last)) = summary.span {
        println!("  span:     {first} .. {last} ({} ms)", last.saturating_sub(first));
    }
    println!("  rejected: {}", summary.rejected.len());
    for line in &summary.rejected {
        println!("    line {line}");
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct Summary {
    events: usize,
    per_kind: BTreeMap<String, usize>,
    origins: BTreeSet<String>,
    /// First and last timestamp seen.
    span: Option<(u64, u64)>,
    rejected: Vec<usize>,
}

impl Summary {
    fn of(loaded: &LoadedLog) -> Self {
        let mut summary = Summary {
            events: loaded.events.len(),
            rejected: loaded.rejected.iter().map(|r| r.line_number).collect(),
            ..Summary::default()
        };
        for ty in EventType::ALL {
            summary.per_kind.insert(ty.name().to_string(), 0);
        }
        for event in &loaded.events {
            *summary.per_kind.entry(event.event_type().name().to_string()).or_default() += 1;
            summary.origins.insert(event.origin.to_string());
            summary.span = Some(match summary.span {
                None => (event.timestamp, event.timestamp),
                Some((first, last)) => (first.min(event.timestamp), last.max(event.timestamp)),
            });
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Event, EventPayload, LayerDelta, Origin, Point, Shape};

    fn ev(origin: &str, ts: u64, payload: EventPayload) -> Event {
        Event::new(Origin::from(origin), ts, payload)
    }

    fn sample() -> Vec<Event> {
        let circle = Shape::circle("circle-a-0", Point::new(0.0, 0.0), 2.0);
        let rect = Shape::rectangle("rect-b-0", Point::new(0.0, 0.0), Point::new(2.0, 2.0));
        vec![
            ev("a", 100, EventPayload::added(circle)),
            ev("b", 120, EventPayload::added(rect)),
            ev("b", 130, EventPayload::selected("rect-b-0", "#f00")),
            ev("a", 150, EventPayload::layer_changed("circle-a-0", LayerDelta::ToFront)),
        ]
    }

    #[test]
    fn test_cli_parses_compact_output_flag() {
        let cli = Cli::try_parse_from(["easel", "compact", "in.ndjson", "-o", "out.ndjson"]).unwrap();
        match cli.command {
            Commands::Compact { input, output } => {
                assert_eq!(input, PathBuf::from("in.ndjson"));
                assert_eq!(output, Some(PathBuf::from("out.ndjson")));
            }
            _ => panic!("expected compact"),
        }
    }

    #[test]
    fn test_summary_counts() {
        let loaded = LoadedLog {
            events: sample(),
            rejected: Vec::new(),
        };
        let summary = Summary::of(&loaded);
        assert_eq!(summary.events, 4);
        assert_eq!(summary.per_kind["EntityAdded"], 2);
        assert_eq!(summary.per_kind["EntityRemoved"], 0);
        assert_eq!(summary.per_kind["EntityLayerChanged"], 1);
        assert_eq!(summary.origins.len(), 2);
        assert_eq!(summary.span, Some((100, 150)));
    }

    #[test]
    fn test_render_order_back_to_front() {
        let canvas = Canvas::replay(&sample());
        let lines = render_order(&canvas);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("rect-b-0"));
        assert!(lines[0].contains("selected by b"));
        assert!(lines[1].contains("circle-a-0"));
    }

    #[test]
    fn test_compact_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.ndjson");
        let mut events = sample();
        events.push(ev("b", 200, EventPayload::removed("rect-b-0")));
        EventLogFile::write_all(&path, &events).unwrap();

        compact(&path, None).unwrap();
        let loaded = EventLogFile::load(&path).unwrap();
        assert_eq!(loaded.events.len(), 2);
        assert!(loaded.events.iter().all(|e| e.shape_id().as_str() == "circle-a-0"));
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect(&dir.path().join("nope.ndjson")).is_err());
    }
}

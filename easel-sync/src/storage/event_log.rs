//! Newline-delimited JSON event log.
//!
//! Appends go straight to the file through a small buffer that is
//! flushed after every event, so a crash loses at most the event being
//! written. A torn final line simply fails to decode on the next load.
//! Lines are read as raw bytes, so a write torn inside a multibyte
//! character is rejected like any other undecodable line.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use easel_core::Event;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::protocol::{self, Frame, ProtocolError};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Event log I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A raw frame would break the one-event-per-line layout.
    #[error("Frame contains a newline")]
    FrameContainsNewline,
}

/// A line that failed to decode during [`EventLogFile::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number in the file.
    pub line_number: usize,
    pub error: ProtocolError,
}

/// Result of loading a log: the decodable events, in file order, plus
/// what was skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadedLog {
    pub events: Vec<Event>,
    pub rejected: Vec<RejectedLine>,
}

/// Append handle on an event log file.
pub struct EventLogFile {
    path: PathBuf,
    writer: BufWriter<File>,
    appended: u64,
}

impl EventLogFile {
    /// Open (creating if needed) a log for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("Opened event log {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            appended: 0,
        })
    }

    pub fn append(&mut self, event: &Event) -> Result<(), LogError> {
        let line = protocol::encode_str(event)?;
        self.write_line(line.as_bytes())
    }

    /// Append an already encoded frame verbatim.
    pub fn append_frame(&mut self, frame: &[u8]) -> Result<(), LogError> {
        if frame.contains(&b'\n') {
            return Err(LogError::FrameContainsNewline);
        }
        self.write_line(frame)
    }

    fn write_line(&mut self, line: &[u8]) -> Result<(), LogError> {
        self.writer.write_all(line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.appended += 1;
        Ok(())
    }

    /// Flush and fsync.
    pub fn sync(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines appended through this handle.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Read a whole log, top to bottom. Blank lines are ignored;
    /// undecodable lines are logged and reported in `rejected`.
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedLog, LogError> {
        let path = path.as_ref();
        let mut loaded = LoadedLog::default();

        for (n, line) in Self::read_lines(path)?.iter().enumerate() {
            if is_blank(line) {
                continue;
            }
            match protocol::decode(line) {
                Ok(event) => loaded.events.push(event),
                Err(error) => {
                    log::warn!("{}:{}: skipped undecodable event: {error}", path.display(), n + 1);
                    loaded.rejected.push(RejectedLine {
                        line_number: n + 1,
                        error,
                    });
                }
            }
        }

        log::info!(
            "Loaded {} events from {} ({} rejected)",
            loaded.events.len(),
            path.display(),
            loaded.rejected.len()
        );
        Ok(loaded)
    }

    /// Raw lines of a log, without decoding or UTF-8 validation.
    pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<Frame>, LogError> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let mut lines = Vec::new();
        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            if line.last() == Some(&b'\n') {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// Replace the log at `path` with `events`. The new content is
    /// written to a temporary file in the same directory and renamed
    /// over the target, so readers never see a half-written log.
    pub fn write_all<'a>(
        path: impl AsRef<Path>,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Result<usize, LogError> {
        let mut lines = Vec::new();
        for event in events {
            lines.push(protocol::encode(event)?);
        }
        Self::write_lines(path, &lines)
    }

    /// Atomic rewrite with pre-encoded lines.
    pub fn write_lines<S: AsRef<[u8]>>(path: impl AsRef<Path>, lines: &[S]) -> Result<usize, LogError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for line in lines {
                let line = line.as_ref();
                if line.contains(&b'\n') {
                    return Err(LogError::FrameContainsNewline);
                }
                writer.write_all(line)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(io::Error::from)?;

        log::info!("Wrote {} events to {}", lines.len(), path.display());
        Ok(lines.len())
    }
}

pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

impl std::fmt::Debug for EventLogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogFile")
            .field("path", &self.path)
            .field("appended", &self.appended)
            .finish()
    }
}

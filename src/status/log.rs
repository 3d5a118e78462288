// src/status/log.rs

//! Append-only per-dataset status journal on disk.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::errors::Result;
use crate::status::event::{IDENTITY_PREFIX, LogLine, StatusEvent};
use crate::status::snapshot::StatusSnapshot;

/// File suffix the Change Listener watches for.
pub const STATUS_FILE_SUFFIX: &str = "status";

/// `<status_root>/<dataset id>.status`
pub fn status_path(status_root: &Path, dataset_id: &str) -> PathBuf {
    status_root.join(format!("{dataset_id}.{STATUS_FILE_SUFFIX}"))
}

/// Handle on one dataset's status log.
///
/// `append` is the only write this crate ever performs against the log. Each
/// append opens the file in append mode, writes the whole line with a single
/// `write_all`, and closes it again. Readers only ever see newline-terminated
/// lines, so a line that is still being written is invisible to them.
#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    /// Open the log, creating it with an identity marker on first touch.
    pub fn open(path: impl Into<PathBuf>, dataset_id: &str) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(format!("{IDENTITY_PREFIX}{dataset_id}\n").as_bytes())?;
                debug!(path = ?path, dataset = %dataset_id, "created status log");
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self { path })
    }

    /// Handle on a log that may not exist yet. Nothing is created until the
    /// first `append`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Never rewrites existing lines.
    pub fn append(&self, event: &StatusEvent) -> Result<()> {
        let mut line = event.to_line();
        line.push('\n');

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        trace!(path = ?self.path, line = %line.trim_end(), "appended status event");
        Ok(())
    }

    /// Read the whole log as classified lines.
    ///
    /// Each call takes a fresh snapshot of the file, so the iterator can be
    /// restarted simply by calling `read` again. A missing file reads as
    /// empty. Bytes that are not UTF-8 are replaced line by line, so a job
    /// writing junk into its message cannot hide the rest of the log.
    pub fn read(&self) -> Result<LogLines> {
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(LogLines::new(content))
    }

    pub fn events(&self) -> Result<Vec<StatusEvent>> {
        Ok(self
            .read()?
            .filter_map(|line| match line {
                LogLine::Event(e) => Some(e),
                _ => None,
            })
            .collect())
    }

    pub fn snapshot(&self) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot::new(self.events()?))
    }
}

/// Lazily parsed complete lines of a status log.
#[derive(Debug)]
pub struct LogLines {
    content: Vec<u8>,
    pos: usize,
}

impl LogLines {
    fn new(content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        Self { content, pos: 0 }
    }
}

impl Iterator for LogLines {
    type Item = LogLine;

    fn next(&mut self) -> Option<LogLine> {
        loop {
            let rest = &self.content[self.pos..];
            // A trailing fragment without '\n' is a write in progress.
            let end = rest.iter().position(|&b| b == b'\n')?;
            let raw = decode_line(&rest[..end]);
            self.pos += end + 1;
            let raw = raw.trim_end_matches('\r');
            if raw.trim().is_empty() {
                continue;
            }
            return Some(LogLine::parse(raw));
        }
    }
}

fn decode_line(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Read only the identity marker of a status log, if it has one.
pub fn read_identity(path: &Path) -> Result<Option<String>> {
    let file = File::open(path)?;
    let mut first = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut first)?;
    match LogLine::parse(decode_line(&first).trim_end()) {
        LogLine::Identity(id) if !id.is_empty() => Ok(Some(id)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_trailing_line_is_not_visible() {
        let lines: Vec<LogLine> = LogLines::new(
            "DATASETID=x\nSTAT:20210101_000000_000000:A:B:Pass\nSTAT:2021".to_string(),
        )
        .collect();
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[1], LogLine::Event(_)));
    }

    #[test]
    fn invalid_utf8_line_does_not_hide_the_log() {
        let mut raw = b"DATASETID=x\n# note \xff\xfe from job\n".to_vec();
        raw.extend_from_slice(b"STAT:20210101_000000_000000:A:B:Pass\n");
        let lines: Vec<LogLine> = LogLines::new(raw).collect();
        assert_eq!(lines.len(), 3);
        assert!(matches!(lines[1], LogLine::Comment(_)));
        assert!(matches!(lines[2], LogLine::Event(_)));
    }

    #[test]
    fn identity_survives_invalid_utf8_further_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.status");
        fs::write(&path, b"DATASETID=x\n\xff\xfe\n").unwrap();
        assert_eq!(read_identity(&path).unwrap().as_deref(), Some("x"));
        assert_eq!(StatusLog { path }.read().unwrap().count(), 2);
    }
}

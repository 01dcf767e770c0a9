//! Write-ahead log file operations.
//!
//! Record format: one JSON object per line, UTF-8. The trailing newline is
//! the crash-atomicity primitive: a record that was torn mid-write has no
//! terminator (or does not parse) and is discarded during replay, so a
//! `bulk_set` is either fully present or fully absent after a crash.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use drift_core::{Error, LogEntry, Result};

/// Handle to the append-only log file.
///
/// Opened once per node; only the master-mutex holder writes to it.
pub struct Wal {
    file: File,
    path: PathBuf,
}

impl Wal {
    /// Open the log at `path` in append mode, creating it if needed.
    pub fn open(path: &Path) -> Result<Wal> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Wal {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append one entry and force it to stable storage.
    ///
    /// Returns only after `fsync` has succeeded; a device failure here is
    /// fatal to the node; the write must never be acknowledged.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(Error::WalAppend)?;
        self.file.sync_all().map_err(Error::WalAppend)?;
        Ok(())
    }

    /// Drop all records, e.g. after a snapshot has made them redundant.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Flush any pending data; called on graceful shutdown.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Path this log was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay the log at `path`, feeding each parseable record to `apply`
    /// in append order.
    ///
    /// Blank lines are skipped. The scan stops cleanly at the first record
    /// that is unterminated or fails to parse: that is the torn tail of a
    /// crashed append, and everything from it onward is discarded. The
    /// outcome reports how many bytes of the file hold good records, so
    /// recovery can truncate the torn tail before the log is appended to
    /// again; otherwise the next append would hide behind unparseable
    /// bytes and be lost to every future replay.
    pub fn replay<F>(path: &Path, mut apply: F) -> Result<ReplayOutcome>
    where
        F: FnMut(LogEntry),
    {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReplayOutcome::default())
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut outcome = ReplayOutcome::default();

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            if !line.ends_with('\n') {
                debug!(path = %path.display(), "unterminated trailing record, discarding");
                break;
            }
            if line.trim().is_empty() {
                outcome.valid_len += read as u64;
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => {
                    apply(entry);
                    outcome.applied += 1;
                    outcome.valid_len += read as u64;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        record = outcome.applied,
                        error = %e,
                        "unparseable log record, stopping replay"
                    );
                    break;
                }
            }
        }

        Ok(outcome)
    }
}

/// What a replay found: records applied, and the length of the good prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Records fed to the apply callback.
    pub applied: usize,
    /// Bytes of the file covered by complete, parseable records.
    pub valid_len: u64,
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dedup ledger — durable record of every job id already handed to the
// print backend.
//
// The ledger is an append-only file with one JSON `LedgerEntry` per line.
// A record is only considered written once its terminating newline has been
// flushed to disk, so a crash mid-append leaves an unterminated tail that is
// discarded (and truncated away) the next time the ledger is opened. Lookups
// are served from an in-memory map rebuilt from the file at startup.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use partyprint_core::error::{PartyPrintError, Result};
use partyprint_core::types::{JobId, LedgerEntry};
use tracing::{debug, info, instrument, warn};

/// "Has this job already been dispatched?" with at-most-once inserts.
///
/// The poll loop is the only reader and writer, so implementations need no
/// locking, only crash safety.
pub trait DispatchLedger: Send {
    /// Whether `job_id` has been recorded.
    fn contains(&self, job_id: &JobId) -> bool;

    /// Durably record `job_id`.
    ///
    /// Returns `Ok(false)` without writing anything if the id is already
    /// present. Once this returns `Ok`, the record survives a crash.
    fn record(&mut self, job_id: &JobId) -> Result<bool>;
}

/// File-backed ledger.
pub struct FileLedger {
    path: PathBuf,
    file: File,
    /// Length of the file up to the last complete record.
    len: u64,
    entries: HashMap<JobId, DateTime<Utc>>,
}

impl FileLedger {
    /// Open (or create) the ledger at `path` and load every complete record.
    ///
    /// Unparseable complete lines are skipped with a warning. An unterminated
    /// final line is a torn write and is truncated.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                PartyPrintError::Ledger(format!("create {}: {e}", parent.display()))
            })?;
        }

        let existed = path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| PartyPrintError::Ledger(format!("open {}: {e}", path.display())))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| PartyPrintError::Ledger(format!("read {}: {e}", path.display())))?;

        let (entries, valid_len, skipped) = parse_ledger(&contents);

        if valid_len < contents.len() {
            warn!(
                discarded_bytes = contents.len() - valid_len,
                "ledger ends in a torn write, truncating"
            );
            file.set_len(valid_len as u64)
                .and_then(|_| file.sync_all())
                .map_err(|e| PartyPrintError::Ledger(format!("truncate torn tail: {e}")))?;
        }
        if skipped > 0 {
            warn!(skipped, "ledger contains unreadable records, ignoring them");
        }
        if !existed {
            sync_parent_dir(&path)?;
        }

        info!(entries = entries.len(), "dispatch ledger opened");
        Ok(Self {
            path,
            file,
            len: valid_len as u64,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one terminated line and flush it to disk.
    ///
    /// On failure the file is cut back to the last complete record so a
    /// later append cannot glue itself onto a fragment.
    fn append_line(&mut self, line: &[u8]) -> Result<()> {
        let written = self
            .file
            .write_all(line)
            .and_then(|_| self.file.sync_data());

        if let Err(e) = written {
            if let Err(rollback) = self.file.set_len(self.len) {
                warn!(error = %rollback, "could not roll back partial ledger write");
            }
            return Err(PartyPrintError::Ledger(format!(
                "append to {}: {e}",
                self.path.display()
            )));
        }

        self.len += line.len() as u64;
        Ok(())
    }
}

impl DispatchLedger for FileLedger {
    fn contains(&self, job_id: &JobId) -> bool {
        self.entries.contains_key(job_id)
    }

    #[instrument(skip(self), fields(%job_id))]
    fn record(&mut self, job_id: &JobId) -> Result<bool> {
        if self.contains(job_id) {
            debug!("job already in ledger, not recording twice");
            return Ok(false);
        }

        let entry = LedgerEntry {
            job_id: job_id.clone(),
            dispatched_at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| PartyPrintError::Ledger(format!("serialize entry: {e}")))?;
        line.push(b'\n');

        self.append_line(&line)?;
        self.entries.insert(entry.job_id, entry.dispatched_at);

        info!("job recorded in ledger");
        Ok(true)
    }
}

/// Parse complete records. Returns the entries, the byte length up to and
/// including the last newline, and the number of unreadable lines.
fn parse_ledger(contents: &[u8]) -> (HashMap<JobId, DateTime<Utc>>, usize, usize) {
    let valid_len = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);

    let mut entries = HashMap::new();
    let mut skipped = 0;
    for line in contents[..valid_len].split(|&b| b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<LedgerEntry>(line) {
            Ok(entry) => {
                // First record wins; a duplicate line never adds a second entry.
                entries.entry(entry.job_id).or_insert(entry.dispatched_at);
            }
            Err(_) => skipped += 1,
        }
    }
    (entries, valid_len, skipped)
}

/// Make a freshly created ledger file's directory entry durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| PartyPrintError::Ledger(format!("sync {}: {e}", parent.display())))
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

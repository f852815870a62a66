// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of every job outcome.
//
// Schema:
//   audit_log(
//     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp     TEXT    NOT NULL,   -- RFC 3339
//     action        TEXT    NOT NULL,   -- see `AuditAction`
//     job_id        TEXT    NOT NULL,
//     document_hash TEXT,               -- SHA-256 hex of the downloaded payload
//     success       INTEGER NOT NULL,   -- 0 = failure, 1 = success
//     details       TEXT                -- optional free-form context
//   )
//
// The audit trail is for the operator only. The dedup ledger, not this
// table, decides whether a job has been printed.

use std::path::Path;

use chrono::Utc;
use partyprint_core::error::PartyPrintError;
use partyprint_core::types::JobId;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     TEXT    NOT NULL,
    action        TEXT    NOT NULL,
    job_id        TEXT    NOT NULL,
    document_hash TEXT,
    success       INTEGER NOT NULL,
    details       TEXT
);";

/// Convert a `rusqlite::Error` into a `PartyPrintError::Database`.
fn db_err(e: rusqlite::Error) -> PartyPrintError {
    PartyPrintError::Database(e.to_string())
}

/// What happened to a job in one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Dispatched,
    DuplicateSkipped,
    DownloadFailed,
    NormalizeFailed,
    DispatchFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::DuplicateSkipped => "duplicate_skipped",
            Self::DownloadFailed => "download_failed",
            Self::NormalizeFailed => "normalize_failed",
            Self::DispatchFailed => "dispatch_failed",
        }
    }
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub job_id: String,
    pub document_hash: Option<String>,
    pub success: bool,
    pub details: Option<String>,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`.
    ///
    /// WAL mode survives the kiosk losing power mid-write.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PartyPrintError> {
        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self, PartyPrintError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self { conn })
    }

    /// Record a new audit entry.
    #[instrument(skip(self, details), fields(action = action.as_str(), %job_id, success))]
    pub fn record(
        &self,
        action: AuditAction,
        job_id: &JobId,
        document_hash: Option<&str>,
        success: bool,
        details: Option<&str>,
    ) -> Result<(), PartyPrintError> {
        let timestamp = Utc::now().to_rfc3339();
        let success_int: i32 = if success { 1 } else { 0 };

        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, action, job_id, document_hash, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    timestamp,
                    action.as_str(),
                    job_id.as_str(),
                    document_hash,
                    success_int,
                    details
                ],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries for one job, oldest first.
    pub fn entries_for_job(&self, job_id: &JobId) -> Result<Vec<AuditEntry>, PartyPrintError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, action, job_id, document_hash, success, details
                 FROM audit_log
                 WHERE job_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![job_id.as_str()], row_to_entry)
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    /// Return the total number of entries in the audit log.
    pub fn count(&self) -> Result<u64, PartyPrintError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        action: row.get(2)?,
        job_id: row.get(3)?,
        document_hash: row.get(4)?,
        success: row.get::<_, i32>(5)? != 0,
        details: row.get(6)?,
    })
}

//! Case store with a transient in-memory fallback.
//!
//! A submission must not be lost because the database is locked, missing or
//! read-only. Failed inserts are held in `pending` and retried by
//! `flush_pending`; reads merge stored and pending records.
//!
//! With a spill file attached, `pending` is mirrored to disk as JSON lines
//! after every change, and the next process to attach the same file replays
//! it into the database.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::repository::{get_all_cases, insert_case};
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::CaseReport;
use crate::outcome::{FallbackReason, Outcome};

pub struct CaseStore {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    spill: Option<PathBuf>,
    spill_synced: bool,
    pending: Vec<CaseReport>,
}

/// Spilled reports plus the number of lines that could not be read back.
fn read_spill(path: &Path) -> io::Result<(Vec<CaseReport>, usize)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reports = Vec::new();
    let mut unreadable = 0;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CaseReport>(&line) {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable spilled case");
                unreadable += 1;
            }
        }
    }
    Ok((reports, unreadable))
}

fn write_spill(path: &Path, reports: &[CaseReport]) -> io::Result<()> {
    if reports.is_empty() {
        return match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    let mut out = BufWriter::new(File::create(&tmp)?);
    for report in reports {
        serde_json::to_writer(&mut out, report)?;
        out.write_all(b"\n")?;
    }
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    fs::rename(&tmp, path)
}

impl CaseStore {
    /// Open the store at `path`. An unreachable database yields a store that
    /// buffers in memory and retries the connection on the next write.
    pub fn open(path: &Path) -> Self {
        let conn = match open_database(path) {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Case store unavailable, buffering in memory");
                None
            }
        };
        Self {
            conn,
            path: Some(path.to_path_buf()),
            spill: None,
            spill_synced: true,
            pending: Vec::new(),
        }
    }

    /// Attach a spill file. Cases an earlier process left there join the
    /// buffer and are flushed right away when the database is reachable.
    /// Unreadable lines are preserved beside it with a `.rejected` suffix.
    pub fn with_spill(mut self, spill: &Path) -> Self {
        match read_spill(spill) {
            Ok((reports, unreadable)) => {
                if unreadable > 0 {
                    let rejected = spill.with_extension("jsonl.rejected");
                    if let Err(e) = fs::copy(spill, &rejected) {
                        tracing::warn!(path = %rejected.display(), error = %e, "Could not preserve unreadable spill");
                        // Leave the file alone rather than overwrite what could not be read
                        return self;
                    }
                }
                self.spill = Some(spill.to_path_buf());
                if reports.is_empty() {
                    return self;
                }
                tracing::info!(path = %spill.display(), count = reports.len(), "Replaying spilled cases");
                for report in reports {
                    if !self.pending.iter().any(|p| p.case_id == report.case_id) {
                        self.pending.push(report);
                    }
                }
                if let Err(e) = self.flush_pending() {
                    tracing::warn!(error = %e, "Spilled cases not stored yet");
                }
                self.sync_spill();
            }
            Err(e) => {
                tracing::warn!(path = %spill.display(), error = %e, "Spill file unreadable, left in place");
            }
        }
        self
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            path: None,
            spill: None,
            spill_synced: true,
            pending: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub fn pending(&self) -> &[CaseReport] {
        &self.pending
    }

    /// True when every buffered case is also in the spill file.
    pub fn pending_on_disk(&self) -> bool {
        self.pending.is_empty() || (self.spill.is_some() && self.spill_synced)
    }

    fn sync_spill(&mut self) {
        let Some(ref spill) = self.spill else {
            return;
        };
        match write_spill(spill, &self.pending) {
            Ok(()) => self.spill_synced = true,
            Err(e) => {
                tracing::error!(path = %spill.display(), error = %e, "Could not write spill file");
                self.spill_synced = false;
            }
        }
    }

    fn reconnect(&mut self) {
        if self.conn.is_some() {
            return;
        }
        if let Some(ref path) = self.path {
            match open_database(path) {
                Ok(conn) => {
                    tracing::info!(path = %path.display(), "Case store reconnected");
                    self.conn = Some(conn);
                }
                Err(e) => tracing::debug!(error = %e, "Case store still unavailable"),
            }
        }
    }

    /// Persist one case. Storage errors buffer the record and return
    /// `RecoverableDefault`; a duplicate id is a `Failure` and nothing is kept.
    pub fn submit(&mut self, report: CaseReport) -> Outcome<String> {
        self.reconnect();
        let case_id = report.case_id.clone();

        if self.pending.iter().any(|p| p.case_id == case_id) {
            return Outcome::Failure {
                reason: format!("case {case_id} is already awaiting storage"),
            };
        }

        let Some(conn) = self.conn.as_ref() else {
            self.pending.push(report);
            self.sync_spill();
            return Outcome::fallback(
                case_id,
                FallbackReason::StorageUnavailable("no database connection".into()),
            );
        };

        match insert_case(conn, &report) {
            Ok(()) => {
                tracing::info!(case_id = %case_id, classification = %report.classification, "Case saved");
                Outcome::success(case_id)
            }
            Err(DatabaseError::ConstraintViolation(msg)) => {
                tracing::warn!(case_id = %case_id, "Case rejected: {msg}");
                Outcome::Failure { reason: msg }
            }
            Err(e) => {
                tracing::warn!(case_id = %case_id, error = %e, "Case buffered in memory");
                self.pending.push(report);
                self.sync_spill();
                Outcome::fallback(case_id, FallbackReason::StorageUnavailable(e.to_string()))
            }
        }
    }

    /// Retry buffered cases in submission order. Stops at the first failure
    /// and keeps the remainder. Returns how many were written.
    pub fn flush_pending(&mut self) -> Result<usize, DatabaseError> {
        let before = self.pending.len();
        let result = self.write_pending();
        if self.pending.len() != before {
            self.sync_spill();
        }
        result
    }

    fn write_pending(&mut self) -> Result<usize, DatabaseError> {
        self.reconnect();
        let Some(conn) = self.conn.as_ref() else {
            return Ok(0);
        };

        let mut written = 0;
        while let Some(report) = self.pending.first() {
            match insert_case(conn, report) {
                Ok(()) => {
                    self.pending.remove(0);
                    written += 1;
                }
                Err(DatabaseError::ConstraintViolation(msg)) => {
                    // Already stored by an earlier, partially failed flush
                    tracing::warn!("Dropping buffered duplicate: {msg}");
                    self.pending.remove(0);
                }
                Err(e) => {
                    if written > 0 {
                        tracing::info!(written, remaining = self.pending.len(), "Partial flush");
                    }
                    return Err(e);
                }
            }
        }
        if written > 0 {
            tracing::info!(written, "Buffered cases flushed");
        }
        Ok(written)
    }

    /// Stored cases followed by any still-buffered ones.
    pub fn all_cases(&self) -> Outcome<Vec<CaseReport>> {
        let Some(conn) = self.conn.as_ref() else {
            return Outcome::fallback(
                self.pending.clone(),
                FallbackReason::StorageUnavailable("no database connection".into()),
            );
        };
        match get_all_cases(conn) {
            Ok(mut cases) => {
                cases.extend(self.pending.iter().cloned());
                Outcome::success(cases)
            }
            Err(e) => Outcome::fallback(
                self.pending.clone(),
                FallbackReason::StorageUnavailable(e.to_string()),
            ),
        }
    }
}

//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{
    BookContent, ChangeEntry, ChangeKind, ContentHash, FailedUrl, FieldChange, Identity, Record,
    RunId, RunSummary,
};
use crate::state::RunState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ReportRecord, RunRecord};
use crate::ShelfError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::collections::HashSet;
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, state, total_targets,
    skipped_count, new_count, updated_count, unchanged_count, failed_count, failed_json";

const CHANGE_COLUMNS: &str = "identity, source_url, kind, run_id, detected_at, diff_json";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// `synchronous = FULL` makes every committed transaction durable before
    /// the call returns, which checkpoint ordering relies on.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ShelfError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ShelfError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ShelfError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Runs raw SQL against the database (for fault injection in tests)
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Formats a timestamp with fixed nanosecond precision so stored strings sort
/// chronologically and round-trip exactly
fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_db_time(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

/// Raw `runs` row before timestamp and enum decoding
struct RunRow {
    id: String,
    started_at: String,
    finished_at: Option<String>,
    config_hash: String,
    state: String,
    total_targets: i64,
    skipped: i64,
    new_count: i64,
    updated_count: i64,
    unchanged_count: i64,
    failed_count: i64,
    failed_json: String,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            state: row.get(4)?,
            total_targets: row.get(5)?,
            skipped: row.get(6)?,
            new_count: row.get(7)?,
            updated_count: row.get(8)?,
            unchanged_count: row.get(9)?,
            failed_count: row.get(10)?,
            failed_json: row.get(11)?,
        })
    }

    fn decode(self) -> StorageResult<RunRecord> {
        let state = RunState::from_db_string(&self.state)
            .ok_or_else(|| StorageError::Serialization(format!("unknown run state '{}'", self.state)))?;
        let failed: Vec<FailedUrl> = serde_json::from_str(&self.failed_json)?;

        Ok(RunRecord {
            id: RunId::new(self.id),
            started_at: parse_db_time(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_db_time).transpose()?,
            config_hash: self.config_hash,
            state,
            total_targets: self.total_targets as u64,
            skipped: self.skipped as u64,
            new_count: self.new_count as u64,
            updated_count: self.updated_count as u64,
            unchanged_count: self.unchanged_count as u64,
            failed_count: self.failed_count as u64,
            failed,
        })
    }
}

/// Raw `records` row
struct RecordRow {
    identity: String,
    source_url: String,
    content_json: String,
    raw_snapshot: String,
    content_hash: String,
    first_seen: String,
    last_updated: String,
}

impl RecordRow {
    fn decode(self) -> StorageResult<Record> {
        let content: BookContent = serde_json::from_str(&self.content_json)?;
        Ok(Record {
            identity: Identity::new(self.identity),
            source_url: self.source_url,
            content,
            raw_snapshot: self.raw_snapshot,
            content_hash: ContentHash::from_hex(self.content_hash),
            first_seen: parse_db_time(&self.first_seen)?,
            last_updated: parse_db_time(&self.last_updated)?,
        })
    }
}

/// Raw `changes` row
struct ChangeRow {
    identity: String,
    source_url: String,
    kind: String,
    run_id: String,
    detected_at: String,
    diff_json: String,
}

impl ChangeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identity: row.get(0)?,
            source_url: row.get(1)?,
            kind: row.get(2)?,
            run_id: row.get(3)?,
            detected_at: row.get(4)?,
            diff_json: row.get(5)?,
        })
    }

    fn decode(self) -> StorageResult<ChangeEntry> {
        let kind = ChangeKind::from_db_string(&self.kind)
            .ok_or_else(|| StorageError::Serialization(format!("unknown change kind '{}'", self.kind)))?;
        let changes: Vec<FieldChange> = serde_json::from_str(&self.diff_json)?;

        Ok(ChangeEntry {
            identity: Identity::new(self.identity),
            source_url: self.source_url,
            kind,
            run_id: RunId::new(self.run_id),
            detected_at: parse_db_time(&self.detected_at)?,
            changes,
        })
    }
}

fn upsert_record(conn: &Connection, record: &Record) -> StorageResult<bool> {
    let content_json = serde_json::to_string(&record.content)?;
    let written = conn.execute(
        "INSERT INTO records
             (identity, source_url, content_json, raw_snapshot, content_hash, first_seen, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(identity) DO UPDATE SET
             source_url = excluded.source_url,
             content_json = excluded.content_json,
             raw_snapshot = excluded.raw_snapshot,
             content_hash = excluded.content_hash,
             last_updated = excluded.last_updated
         WHERE records.content_hash != excluded.content_hash",
        params![
            record.identity.as_str(),
            record.source_url,
            content_json,
            record.raw_snapshot,
            record.content_hash.as_str(),
            to_db_time(&record.first_seen),
            to_db_time(&record.last_updated),
        ],
    )?;
    Ok(written > 0)
}

fn insert_change(conn: &Connection, entry: &ChangeEntry) -> StorageResult<()> {
    let diff_json = serde_json::to_string(&entry.changes)?;
    conn.execute(
        "INSERT INTO changes (identity, source_url, kind, run_id, detected_at, diff_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.identity.as_str(),
            entry.source_url,
            entry.kind.to_db_string(),
            entry.run_id.as_str(),
            to_db_time(&entry.detected_at),
            diff_json,
        ],
    )?;
    Ok(())
}

impl SqliteStorage {
    fn query_runs<P: Params>(&self, sql: &str, params: P) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, RunRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RunRow::decode).collect()
    }

    fn query_changes<P: Params>(&self, sql: &str, params: P) -> StorageResult<Vec<ChangeEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, ChangeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ChangeRow::decode).collect()
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(
        &mut self,
        run_id: &RunId,
        started_at: DateTime<Utc>,
        config_hash: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO runs (id, started_at, config_hash, state) VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id.as_str(),
                to_db_time(&started_at),
                config_hash,
                RunState::Initializing.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.query_runs(&sql, params![run_id.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::RunNotFound(run_id.to_string()))
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        Ok(self.recent_runs(1)?.into_iter().next())
    }

    fn latest_resumable_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE state != ?1 ORDER BY started_at DESC, rowid DESC LIMIT 1",
            RUN_COLUMNS
        );
        Ok(self
            .query_runs(&sql, params![RunState::Completed.to_db_string()])?
            .into_iter()
            .next())
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
            RUN_COLUMNS
        );
        self.query_runs(&sql, params![limit as i64])
    }

    fn update_run_state(&mut self, run_id: &RunId, state: RunState) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET state = ?1 WHERE id = ?2",
            params![state.to_db_string(), run_id.as_str()],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    fn finish_run(&mut self, summary: &RunSummary) -> StorageResult<()> {
        let failed_json = serde_json::to_string(&summary.failed)?;
        let updated = self.conn.execute(
            "UPDATE runs SET state = ?1, finished_at = ?2, total_targets = ?3, skipped_count = ?4,
                 new_count = new_count + ?5, updated_count = updated_count + ?6,
                 unchanged_count = unchanged_count + ?7, failed_count = ?8,
                 failed_json = ?9
             WHERE id = ?10",
            params![
                summary.state.to_db_string(),
                to_db_time(&summary.finished_at),
                summary.total_targets as i64,
                summary.skipped as i64,
                summary.counts.new as i64,
                summary.counts.updated as i64,
                summary.counts.unchanged as i64,
                summary.counts.failed as i64,
                failed_json,
                summary.run_id.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(summary.run_id.to_string()));
        }
        Ok(())
    }

    // ===== Records =====

    fn get_by_identity(&self, identity: &Identity) -> StorageResult<Option<Record>> {
        let row = self
            .conn
            .query_row(
                "SELECT identity, source_url, content_json, raw_snapshot, content_hash,
                        first_seen, last_updated
                 FROM records WHERE identity = ?1",
                params![identity.as_str()],
                |row| {
                    Ok(RecordRow {
                        identity: row.get(0)?,
                        source_url: row.get(1)?,
                        content_json: row.get(2)?,
                        raw_snapshot: row.get(3)?,
                        content_hash: row.get(4)?,
                        first_seen: row.get(5)?,
                        last_updated: row.get(6)?,
                    })
                },
            )
            .optional()?;

        row.map(RecordRow::decode).transpose()
    }

    fn upsert(&mut self, record: &Record) -> StorageResult<bool> {
        upsert_record(&self.conn, record)
    }

    fn append_change(&mut self, entry: &ChangeEntry) -> StorageResult<()> {
        insert_change(&self.conn, entry)
    }

    fn commit_detection(
        &mut self,
        record: &Record,
        change: Option<&ChangeEntry>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        upsert_record(&tx, record)?;
        if let Some(entry) = change {
            insert_change(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn changes_for_run(&self, run_id: &RunId) -> StorageResult<Vec<ChangeEntry>> {
        let sql = format!(
            "SELECT {} FROM changes WHERE run_id = ?1 ORDER BY id",
            CHANGE_COLUMNS
        );
        self.query_changes(&sql, params![run_id.as_str()])
    }

    fn changes_for_identity(&self, identity: &Identity) -> StorageResult<Vec<ChangeEntry>> {
        let sql = format!(
            "SELECT {} FROM changes WHERE identity = ?1 ORDER BY id",
            CHANGE_COLUMNS
        );
        self.query_changes(&sql, params![identity.as_str()])
    }

    // ===== Checkpoints =====

    fn mark_done(&mut self, run_id: &RunId, url: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO checkpoints (run_id, url, done_at) VALUES (?1, ?2, ?3)",
            params![run_id.as_str(), url, to_db_time(&Utc::now())],
        )?;
        Ok(())
    }

    fn is_done(&self, run_id: &RunId, url: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM checkpoints WHERE run_id = ?1 AND url = ?2",
                params![run_id.as_str(), url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn done_urls(&self, run_id: &RunId) -> StorageResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM checkpoints WHERE run_id = ?1")?;
        let urls = stmt
            .query_map(params![run_id.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(urls)
    }

    fn clear_checkpoint(&mut self, run_id: &RunId) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM checkpoints WHERE run_id = ?1",
            params![run_id.as_str()],
        )?;
        Ok(())
    }

    // ===== Reports =====

    fn save_report(&mut self, report: &ReportRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO reports
                 (run_id, report_date, new_count, updated_count, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                report.run_id.as_str(),
                report.report_date,
                report.new_count as i64,
                report.updated_count as i64,
                report.payload_json,
                to_db_time(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn get_report(&self, run_id: &RunId) -> StorageResult<Option<ReportRecord>> {
        let report = self
            .conn
            .query_row(
                "SELECT run_id, report_date, new_count, updated_count, payload_json
                 FROM reports WHERE run_id = ?1",
                params![run_id.as_str()],
                |row| {
                    Ok(ReportRecord {
                        run_id: RunId::new(row.get::<_, String>(0)?),
                        report_date: row.get(1)?,
                        new_count: row.get::<_, i64>(2)? as u64,
                        updated_count: row.get::<_, i64>(3)? as u64,
                        payload_json: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(report)
    }

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_changes_by_kind(&self, kind: ChangeKind) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM changes WHERE kind = ?1",
            params![kind.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn category_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT json_extract(content_json, '$.category') AS category, COUNT(*) AS n
             FROM records
             GROUP BY category
             ORDER BY n DESC, category ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    row.get::<_, i64>(1)? as u64,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{ChangeEntry, ChangeKind, Identity, Record, RunId, RunSummary};
use crate::state::RunState;
use crate::storage::{ReportRecord, RunRecord};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage handle shared between the coordinator and its workers
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Wraps a backend for sharing between workers
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Acquires the shared storage lock
///
/// A poisoned lock means a worker panicked mid-write; it is reported as a
/// storage error instead of propagating the panic.
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage.lock().map_err(|_| StorageError::Poisoned)
}

/// Trait for storage backend implementations
///
/// This trait defines every database operation the pipeline needs. Callers
/// share one backend behind a mutex, so a sequence of calls made while holding
/// the lock is observed atomically by other workers.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a run row in state `Initializing`
    ///
    /// # Arguments
    ///
    /// * `run_id` - Identifier of the new run
    /// * `started_at` - Run timestamp
    /// * `config_hash` - Hash of the configuration file
    fn create_run(
        &mut self,
        run_id: &RunId,
        started_at: chrono::DateTime<chrono::Utc>,
        config_hash: &str,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Gets the most recent run that did not complete cleanly
    fn latest_resumable_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Gets up to `limit` runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    /// Updates the state of a run
    fn update_run_state(&mut self, run_id: &RunId, state: RunState) -> StorageResult<()>;

    /// Stores the terminal state, counts and failed set of a run
    ///
    /// Classification counts add up across the invocations of a resumed run.
    /// State, target totals and the failed set are those of the latest one.
    fn finish_run(&mut self, summary: &RunSummary) -> StorageResult<()>;

    // ===== Records =====

    /// Looks up the stored version of an item
    fn get_by_identity(&self, identity: &Identity) -> StorageResult<Option<Record>>;

    /// Inserts or replaces a record keyed by identity
    ///
    /// A stored record whose content hash equals the incoming one is left
    /// untouched, and `first_seen` is never rewritten.
    ///
    /// # Returns
    ///
    /// `true` if a row was written
    fn upsert(&mut self, record: &Record) -> StorageResult<bool>;

    /// Appends one change entry to the change log
    fn append_change(&mut self, entry: &ChangeEntry) -> StorageResult<()>;

    /// Writes a record and its change entry in one transaction
    ///
    /// Either both become durable or neither does.
    fn commit_detection(
        &mut self,
        record: &Record,
        change: Option<&ChangeEntry>,
    ) -> StorageResult<()>;

    /// Gets the change entries recorded by a run, in insertion order
    fn changes_for_run(&self, run_id: &RunId) -> StorageResult<Vec<ChangeEntry>>;

    /// Gets the change history of one item, oldest first
    fn changes_for_identity(&self, identity: &Identity) -> StorageResult<Vec<ChangeEntry>>;

    // ===== Checkpoints =====

    /// Durably records that `url` was committed in `run_id`
    fn mark_done(&mut self, run_id: &RunId, url: &str) -> StorageResult<()>;

    /// Returns true if `url` was committed in `run_id`
    fn is_done(&self, run_id: &RunId, url: &str) -> StorageResult<bool>;

    /// Gets every URL committed in `run_id`
    fn done_urls(&self, run_id: &RunId) -> StorageResult<HashSet<String>>;

    /// Discards the checkpoint of a run
    fn clear_checkpoint(&mut self, run_id: &RunId) -> StorageResult<()>;

    // ===== Reports =====

    /// Stores the daily report of a run, replacing any earlier one
    fn save_report(&mut self, report: &ReportRecord) -> StorageResult<()>;

    /// Gets the stored report of a run
    fn get_report(&self, run_id: &RunId) -> StorageResult<Option<ReportRecord>>;

    // ===== Statistics =====

    /// Counts stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts change entries of one kind across all runs
    fn count_changes_by_kind(&self, kind: ChangeKind) -> StorageResult<u64>;

    /// Gets the number of records per category, largest first
    fn category_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;
}

//! Storage module for persisting catalog state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - The current version of every record and the append-only change log
//! - Per-run checkpoints for resumption
//! - Run bookkeeping and stored daily reports

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{lock, share, SharedStorage, Storage, StorageError, StorageResult};

use crate::model::{FailedUrl, RunId};
use crate::state::RunState;
use crate::ShelfError;
use chrono::{DateTime, Utc};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(ShelfError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ShelfError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub state: RunState,
    pub total_targets: u64,
    pub skipped: u64,
    pub new_count: u64,
    pub updated_count: u64,
    pub unchanged_count: u64,
    pub failed_count: u64,
    pub failed: Vec<FailedUrl>,
}

/// A persisted daily report row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub run_id: RunId,
    /// Calendar date of the run, `YYYY-MM-DD`
    pub report_date: String,
    pub new_count: u64,
    pub updated_count: u64,
    /// JSON-encoded report body
    pub payload_json: String,
}

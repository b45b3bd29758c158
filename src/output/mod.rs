//! Output module for run summaries and reports
//!
//! This module handles:
//! - Writing markdown summaries of finished runs
//! - Persisting daily reports in the catalog database
//! - Bucketing changes for alerting
//! - Catalog statistics for the `--stats` mode

pub mod alerts;
mod markdown;
mod sqlite_output;
pub mod stats;
mod traits;

pub use alerts::{categorize, AlertDigest, ChangeCategory};
pub use markdown::{format_markdown_summary, generate_markdown_summary, MarkdownSummarySink};
pub use sqlite_output::{DailyReport, ReportLine, SqliteReportSink};
pub use stats::{load_statistics, print_statistics, CatalogStatistics};
pub use traits::{OutputError, OutputResult, SummarySink};

use crate::model::{ClassificationCounts, RunId, RunSummary};
use crate::storage::{RunRecord, Storage, StorageResult};
use crate::ShelfError;

/// Loads the summary of a whole run from storage
///
/// Counts and changes cover every invocation of the run, so a resumed run
/// reports the items committed before it was interrupted as well. The failed
/// set and terminal state are those of the latest invocation.
pub fn load_run_summary(storage: &dyn Storage, run_id: &RunId) -> StorageResult<RunSummary> {
    let run = storage.get_run(run_id)?;
    summary_from_run(storage, run)
}

/// Rebuilds the summary of the latest run from storage
///
/// # Arguments
///
/// * `storage` - The storage backend containing run data
///
/// # Returns
///
/// * `Ok(RunSummary)` - Successfully rebuilt summary
/// * `Err(ShelfError)` - No run recorded, or the store could not be read
pub fn rebuild_latest_summary(storage: &dyn Storage) -> Result<RunSummary, ShelfError> {
    let run = storage
        .latest_run()?
        .ok_or_else(|| ShelfError::Storage("No runs found in database".to_string()))?;

    Ok(summary_from_run(storage, run)?)
}

fn summary_from_run(storage: &dyn Storage, run: RunRecord) -> StorageResult<RunSummary> {
    let changes = storage.changes_for_run(&run.id)?;

    Ok(RunSummary {
        finished_at: run.finished_at.unwrap_or(run.started_at),
        counts: ClassificationCounts {
            new: run.new_count,
            updated: run.updated_count,
            unchanged: run.unchanged_count,
            failed: run.failed_count,
        },
        run_id: run.id,
        state: run.state,
        started_at: run.started_at,
        total_targets: run.total_targets,
        skipped: run.skipped,
        changes,
        failed: run.failed,
    })
}

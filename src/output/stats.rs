//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics from the storage layer.

use crate::model::ChangeKind;
use crate::storage::{RunRecord, Storage};
use crate::ShelfError;

/// Number of runs listed by `--stats`
const RECENT_RUN_LIMIT: usize = 5;

/// Catalog statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    /// Number of items currently stored
    pub total_records: u64,

    /// Change log entries of kind `new`
    pub new_changes: u64,

    /// Change log entries of kind `updated`
    pub updated_changes: u64,

    /// Stored items per category, largest first
    pub categories: Vec<(String, u64)>,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(ShelfError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CatalogStatistics, ShelfError> {
    Ok(CatalogStatistics {
        total_records: storage.count_records()?,
        new_changes: storage.count_changes_by_kind(ChangeKind::New)?,
        updated_changes: storage.count_changes_by_kind(ChangeKind::Updated)?,
        categories: storage.category_breakdown()?,
        recent_runs: storage.recent_runs(RECENT_RUN_LIMIT)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Items tracked: {}", stats.total_records);
    println!("  New item events: {}", stats.new_changes);
    println!("  Update events: {}", stats.updated_changes);
    println!();

    if !stats.categories.is_empty() {
        println!("Items by Category:");
        for (category, count) in &stats.categories {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", category, count, percentage);
        }
        println!();
    }

    if stats.recent_runs.is_empty() {
        println!("No runs recorded yet.");
        return;
    }

    println!("Recent Runs:");
    for run in &stats.recent_runs {
        println!(
            "  {} {} [{}] new={} updated={} unchanged={} failed={}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.id,
            run.state,
            run.new_count,
            run.updated_count,
            run.unchanged_count,
            run.failed_count
        );
    }
}

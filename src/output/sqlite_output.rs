//! Daily report persistence
//!
//! Stores one report row per run in the catalog database so downstream
//! readers can list what changed on a given day without replaying the
//! change log.

use crate::model::{ChangeKind, RunId, RunSummary};
use crate::output::load_run_summary;
use crate::output::traits::{OutputResult, SummarySink};
use crate::state::RunState;
use crate::storage::{lock, ReportRecord, SharedStorage};
use serde::{Deserialize, Serialize};

/// One line of the stored change list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLine {
    pub identity: String,
    pub source_url: String,
    pub kind: ChangeKind,
    /// Rendered field changes, empty for new items
    pub changes: Vec<String>,
}

/// Body of a stored daily report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReport {
    pub run_id: RunId,
    pub date: String,
    pub state: RunState,
    pub new_count: u64,
    pub updated_count: u64,
    pub unchanged_count: u64,
    pub failed_count: u64,
    /// Changes sorted by detection time, cut to the changelog limit
    pub changes: Vec<ReportLine>,
    /// True if the change list was cut
    pub truncated: bool,
}

impl DailyReport {
    /// Builds the report of a run
    ///
    /// # Arguments
    ///
    /// * `summary` - The finished run
    /// * `changelog_limit` - Maximum number of listed changes, `None` for all
    pub fn from_summary(summary: &RunSummary, changelog_limit: Option<usize>) -> Self {
        let sorted = summary.changes_sorted();
        let limit = changelog_limit.unwrap_or(sorted.len());

        let changes = sorted
            .iter()
            .take(limit)
            .map(|entry| ReportLine {
                identity: entry.identity.to_string(),
                source_url: entry.source_url.clone(),
                kind: entry.kind,
                changes: entry.changes.iter().map(|c| c.to_string()).collect(),
            })
            .collect();

        Self {
            run_id: summary.run_id.clone(),
            date: summary.started_at.format("%Y-%m-%d").to_string(),
            state: summary.state,
            new_count: summary.counts.new,
            updated_count: summary.counts.updated,
            unchanged_count: summary.counts.unchanged,
            failed_count: summary.counts.failed,
            changes,
            truncated: sorted.len() > limit,
        }
    }
}

/// Sink that stores a `DailyReport` per run in the catalog database
pub struct SqliteReportSink {
    storage: SharedStorage,
    changelog_limit: Option<usize>,
}

impl SqliteReportSink {
    pub fn new(storage: SharedStorage, changelog_limit: Option<usize>) -> Self {
        Self {
            storage,
            changelog_limit,
        }
    }
}

impl SummarySink for SqliteReportSink {
    fn name(&self) -> &'static str {
        "sqlite-report"
    }

    /// Stores the report of the whole run
    ///
    /// The report is rebuilt from the store rather than from `summary`, which
    /// only covers the latest invocation of a resumed run.
    fn emit(&self, summary: &RunSummary) -> OutputResult<()> {
        let mut storage = lock(&self.storage)?;
        let whole_run = load_run_summary(&*storage, &summary.run_id)?;

        let report = DailyReport::from_summary(&whole_run, self.changelog_limit);
        let record = ReportRecord {
            run_id: report.run_id.clone(),
            report_date: report.date.clone(),
            new_count: report.new_count,
            updated_count: report.updated_count,
            payload_json: serde_json::to_string(&report)?,
        };

        storage.save_report(&record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookContent, ChangeEntry, ClassificationCounts, Identity, Price, Record};
    use crate::storage::{share, SqliteStorage, Storage};
    use chrono::{Duration, TimeZone, Utc};

    fn summary(changes: usize) -> RunSummary {
        let started = Utc.with_ymd_and_hms(2024, 5, 17, 6, 0, 0).unwrap();
        RunSummary {
            run_id: RunId::new("run-1"),
            state: RunState::Completed,
            started_at: started,
            finished_at: started + Duration::minutes(3),
            total_targets: changes as u64,
            skipped: 0,
            counts: ClassificationCounts {
                new: changes as u64,
                ..ClassificationCounts::default()
            },
            changes: (0..changes)
                .map(|i| {
                    ChangeEntry::new_item(
                        Identity::new(format!("book-{}", i)),
                        format!("https://books.example/catalogue/book-{}/index.html", i),
                        RunId::new("run-1"),
                        started + Duration::seconds(i as i64),
                    )
                })
                .collect(),
            failed: vec![],
        }
    }

    #[test]
    fn test_report_respects_changelog_limit() {
        let report = DailyReport::from_summary(&summary(5), Some(3));
        assert_eq!(report.date, "2024-05-17");
        assert_eq!(report.changes.len(), 3);
        assert!(report.truncated);
        assert_eq!(report.changes[0].identity, "book-0");
        assert_eq!(report.new_count, 5);

        let unlimited = DailyReport::from_summary(&summary(5), None);
        assert_eq!(unlimited.changes.len(), 5);
        assert!(!unlimited.truncated);
    }

    fn record_for(entry: &ChangeEntry) -> Record {
        let content = BookContent {
            title: entry.identity.to_string(),
            category: "Poetry".to_string(),
            description: None,
            price_incl_tax: Price::from_minor(1000),
            price_excl_tax: Price::from_minor(1000),
            availability: 1,
            review_count: 0,
            rating: 3,
            image_url: None,
        };
        Record {
            identity: entry.identity.clone(),
            source_url: entry.source_url.clone(),
            content_hash: content.content_hash(),
            content,
            raw_snapshot: String::new(),
            first_seen: entry.detected_at,
            last_updated: entry.detected_at,
        }
    }

    #[test]
    fn test_sink_stores_report() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = summary(2);
        storage
            .create_run(&run.run_id, run.started_at, "hash")
            .unwrap();
        for entry in &run.changes {
            storage.commit_detection(&record_for(entry), Some(entry)).unwrap();
        }
        storage.finish_run(&run).unwrap();
        let shared = share(storage);

        SqliteReportSink::new(shared.clone(), Some(10))
            .emit(&run)
            .unwrap();

        let stored = lock(&shared)
            .unwrap()
            .get_report(&run.run_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.report_date, "2024-05-17");
        assert_eq!(stored.new_count, 2);

        let body: DailyReport = serde_json::from_str(&stored.payload_json).unwrap();
        assert_eq!(body.changes.len(), 2);
    }
}

use crate::model::change::{ChangeEntry, Classification};
use crate::model::record::RunId;
use crate::state::RunState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a URL ended a run without being committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every retry attempt hit a transient error
    TransientExhausted,
    /// The source answered with a non-retryable status
    Permanent,
    /// The payload did not match the expected record shape
    Extraction,
    /// The record could not be written; retried on resume
    StoreWrite,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientExhausted => "transient_exhausted",
            Self::Permanent => "permanent",
            Self::Extraction => "extraction",
            Self::StoreWrite => "store_write",
        }
    }
}

/// A URL in the run's failed set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub new: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub failed: u64,
}

impl ClassificationCounts {
    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::New => self.new += 1,
            Classification::Updated => self.updated += 1,
            Classification::Unchanged => self.unchanged += 1,
        }
    }

    pub fn processed(&self) -> u64 {
        self.new + self.updated + self.unchanged
    }
}

/// Aggregate result of one run, handed to reporting and alerting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Terminal state the run ended in
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Size of the full resolved target set
    pub total_targets: u64,
    /// Targets skipped because an earlier attempt of this run committed them
    pub skipped: u64,
    pub counts: ClassificationCounts,
    /// Change entries produced by this run, in no particular order
    pub changes: Vec<ChangeEntry>,
    pub failed: Vec<FailedUrl>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Changes sorted by detection time, then identity, for presentation
    pub fn changes_sorted(&self) -> Vec<&ChangeEntry> {
        let mut changes: Vec<&ChangeEntry> = self.changes.iter().collect();
        changes.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        changes
    }

    pub fn failed_urls(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.url.as_str()).collect()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_record() {
        let mut counts = ClassificationCounts::default();
        counts.record(Classification::New);
        counts.record(Classification::Unchanged);
        counts.record(Classification::Unchanged);
        counts.failed += 1;

        assert_eq!(counts.new, 1);
        assert_eq!(counts.unchanged, 2);
        assert_eq!(counts.processed(), 3);
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::TransientExhausted).unwrap();
        assert_eq!(json, "\"transient_exhausted\"");
    }
}

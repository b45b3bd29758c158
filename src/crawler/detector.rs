//! Change detection
//!
//! Classifies an extracted record against the stored version of the same
//! identity and produces what must be written: nothing for an unchanged item,
//! otherwise the accepted record plus one change entry.

use crate::model::{
    BookContent, CandidateRecord, ChangeEntry, Classification, FieldChange, FieldName, Record,
    RunId,
};
use crate::storage::{Storage, StorageResult};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Result of classifying one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub classification: Classification,
    /// Record to upsert; `None` when unchanged
    pub record: Option<Record>,
    /// Change entry to append; `None` when unchanged
    pub change: Option<ChangeEntry>,
}

impl Detection {
    fn unchanged() -> Self {
        Self {
            classification: Classification::Unchanged,
            record: None,
            change: None,
        }
    }
}

/// Compares every content field individually
///
/// Returns one entry per differing field, in canonical field order.
pub fn diff_content(old: &BookContent, new: &BookContent) -> Vec<FieldChange> {
    FieldName::ALL
        .iter()
        .filter_map(|&field| {
            let before = old.value(field);
            let after = new.value(field);
            (before != after).then(|| FieldChange {
                field,
                old: before,
                new: after,
            })
        })
        .collect()
}

/// Classifies a candidate against the prior stored record
///
/// # Arguments
///
/// * `candidate` - Freshly extracted item
/// * `prior` - Stored record with the same identity, if any
/// * `run_id` - Run recording the change
/// * `run_ts` - Run timestamp
///
/// # Classification
///
/// | Prior | Hash | Result |
/// |-------|------|--------|
/// | none | - | NEW, first_seen = last_updated = run_ts |
/// | some | equal | UNCHANGED, nothing written |
/// | some | differs | UPDATED, first_seen kept, last_updated = run_ts |
pub fn detect(
    candidate: CandidateRecord,
    prior: Option<&Record>,
    run_id: &RunId,
    run_ts: DateTime<Utc>,
) -> Detection {
    let hash = candidate.content.content_hash();

    let prior = match prior {
        None => {
            let change = ChangeEntry::new_item(
                candidate.identity.clone(),
                candidate.source_url.clone(),
                run_id.clone(),
                run_ts,
            );
            let record = Record {
                identity: candidate.identity,
                source_url: candidate.source_url,
                content: candidate.content,
                raw_snapshot: candidate.raw_snapshot,
                content_hash: hash,
                first_seen: run_ts,
                last_updated: run_ts,
            };
            return Detection {
                classification: Classification::New,
                record: Some(record),
                change: Some(change),
            };
        }
        Some(prior) => prior,
    };

    if prior.content_hash == hash {
        return Detection::unchanged();
    }

    let changes = diff_content(&prior.content, &candidate.content);
    if changes.is_empty() {
        // Stored hash was computed under a different serialization
        warn!(
            identity = %candidate.identity,
            "content hash differs but no field changed; treating as unchanged"
        );
        return Detection::unchanged();
    }

    let change = ChangeEntry::updated(
        candidate.identity.clone(),
        candidate.source_url.clone(),
        run_id.clone(),
        run_ts,
        changes,
    );
    let record = Record {
        identity: candidate.identity,
        source_url: candidate.source_url,
        content: candidate.content,
        raw_snapshot: candidate.raw_snapshot,
        content_hash: hash,
        first_seen: prior.first_seen,
        last_updated: prior.last_updated.max(run_ts),
    };

    Detection {
        classification: Classification::Updated,
        record: Some(record),
        change: Some(change),
    }
}

/// Reads the prior version, classifies, and commits the result
///
/// Callers hold the storage lock for the whole call, so a second candidate
/// for the same identity observes this one's write.
pub fn classify_and_commit(
    storage: &mut dyn Storage,
    candidate: CandidateRecord,
    run_id: &RunId,
    run_ts: DateTime<Utc>,
) -> StorageResult<Detection> {
    let prior = storage.get_by_identity(&candidate.identity)?;
    let detection = detect(candidate, prior.as_ref(), run_id, run_ts);

    if let Some(record) = &detection.record {
        storage.commit_detection(record, detection.change.as_ref())?;
    }

    Ok(detection)
}

use crate::model::field::{FieldChange, FieldName};
use crate::model::record::{Identity, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of comparing an extracted item with stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    New,
    Updated,
    Unchanged,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Updated => "UPDATED",
            Self::Unchanged => "UNCHANGED",
        };
        f.write_str(s)
    }
}

/// Kind of a recorded change; unchanged items never produce one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Updated,
}

impl ChangeKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "updated" => Some(Self::Updated),
            _ => None,
        }
    }
}

/// One detected change for one item in one run
///
/// Entries are append-only facts: they are never updated or merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub identity: Identity,
    pub source_url: String,
    pub kind: ChangeKind,
    pub run_id: RunId,
    pub detected_at: DateTime<Utc>,
    /// Differing fields; always empty for `ChangeKind::New`
    pub changes: Vec<FieldChange>,
}

impl ChangeEntry {
    pub fn new_item(
        identity: Identity,
        source_url: String,
        run_id: RunId,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            source_url,
            kind: ChangeKind::New,
            run_id,
            detected_at,
            changes: Vec::new(),
        }
    }

    pub fn updated(
        identity: Identity,
        source_url: String,
        run_id: RunId,
        detected_at: DateTime<Utc>,
        changes: Vec<FieldChange>,
    ) -> Self {
        Self {
            identity,
            source_url,
            kind: ChangeKind::Updated,
            run_id,
            detected_at,
            changes,
        }
    }

    pub fn field_change(&self, field: FieldName) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    pub fn touches(&self, field: FieldName) -> bool {
        self.field_change(field).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::FieldValue;
    use crate::model::record::Price;

    #[test]
    fn test_change_kind_roundtrip() {
        for kind in [ChangeKind::New, ChangeKind::Updated] {
            assert_eq!(ChangeKind::from_db_string(kind.to_db_string()), Some(kind));
        }
        assert_eq!(ChangeKind::from_db_string("deleted"), None);
    }

    #[test]
    fn test_field_lookup() {
        let entry = ChangeEntry::updated(
            Identity::new("book-42"),
            "https://books.example/book-42/index.html".to_string(),
            RunId::new("run-1"),
            Utc::now(),
            vec![FieldChange {
                field: FieldName::PriceInclTax,
                old: FieldValue::Money(Price::from_minor(1000)),
                new: FieldValue::Money(Price::from_minor(1200)),
            }],
        );

        assert!(entry.touches(FieldName::PriceInclTax));
        assert!(!entry.touches(FieldName::Availability));
        assert_eq!(
            entry.field_change(FieldName::PriceInclTax).map(|c| c.to_string()),
            Some("price_incl_tax: 10.00 -> 12.00".to_string())
        );
    }
}

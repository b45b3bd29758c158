//! Change alert bucketing
//!
//! Groups the changes of a run into the buckets a notification would list:
//! new items, price changes, stock changes and everything else. Delivery is
//! left to the caller.

use crate::model::{ChangeEntry, ChangeKind, FieldName, RunId, RunSummary};
use serde::Serialize;
use std::fmt::Write;

/// Alert bucket of one change entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    New,
    Price,
    Stock,
    Other,
}

impl ChangeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New items",
            Self::Price => "Price changes",
            Self::Stock => "Stock changes",
            Self::Other => "Other changes",
        }
    }
}

/// Buckets one entry; a price change wins over a stock change
pub fn categorize(entry: &ChangeEntry) -> ChangeCategory {
    if entry.kind == ChangeKind::New {
        return ChangeCategory::New;
    }
    if entry.changes.iter().any(|c| c.field.is_price()) {
        return ChangeCategory::Price;
    }
    if entry.touches(FieldName::Availability) {
        return ChangeCategory::Stock;
    }
    ChangeCategory::Other
}

/// Changes of one run, bucketed for notification
#[derive(Debug, Clone, Serialize)]
pub struct AlertDigest {
    pub run_id: RunId,
    pub new: Vec<ChangeEntry>,
    pub price: Vec<ChangeEntry>,
    pub stock: Vec<ChangeEntry>,
    pub other: Vec<ChangeEntry>,
}

impl AlertDigest {
    pub fn from_summary(summary: &RunSummary) -> Self {
        let mut digest = Self {
            run_id: summary.run_id.clone(),
            new: Vec::new(),
            price: Vec::new(),
            stock: Vec::new(),
            other: Vec::new(),
        };

        for entry in summary.changes_sorted() {
            let bucket = match categorize(entry) {
                ChangeCategory::New => &mut digest.new,
                ChangeCategory::Price => &mut digest.price,
                ChangeCategory::Stock => &mut digest.stock,
                ChangeCategory::Other => &mut digest.other,
            };
            bucket.push(entry.clone());
        }

        digest
    }

    pub fn total(&self) -> usize {
        self.new.len() + self.price.len() + self.stock.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn buckets(&self) -> [(ChangeCategory, &[ChangeEntry]); 4] {
        [
            (ChangeCategory::New, self.new.as_slice()),
            (ChangeCategory::Price, self.price.as_slice()),
            (ChangeCategory::Stock, self.stock.as_slice()),
            (ChangeCategory::Other, self.other.as_slice()),
        ]
    }

    /// Plain-text body suitable for a notification message
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Catalog changes for run {}", self.run_id);

        for (category, entries) in self.buckets() {
            if entries.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{} ({}):", category.label(), entries.len());
            for entry in entries {
                if entry.changes.is_empty() {
                    let _ = writeln!(out, "  - {} {}", entry.identity, entry.source_url);
                } else {
                    let fields: Vec<String> = entry.changes.iter().map(|c| c.to_string()).collect();
                    let _ = writeln!(out, "  - {}: {}", entry.identity, fields.join("; "));
                }
            }
        }

        out
    }
}

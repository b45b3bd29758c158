//! Data contracts shared by the pipeline
//!
//! - `Record` / `CandidateRecord`: one catalog item, stored or freshly extracted
//! - `FieldName` / `FieldValue` / `FieldChange`: the typed content schema and diffs
//! - `ContentHash`: digest over the canonical serialization of content fields
//! - `ChangeEntry`: one immutable change fact for one run
//! - `RunSummary`: aggregate result handed to reporting collaborators

mod change;
mod field;
mod hash;
mod record;
mod summary;

pub use change::{ChangeEntry, ChangeKind, Classification};
pub use field::{FieldChange, FieldName, FieldValue};
pub use hash::{canonical_serialization, content_hash, ContentHash};
pub use record::{BookContent, CandidateRecord, Identity, Price, Record, RunId};
pub use summary::{ClassificationCounts, FailedUrl, FailureKind, RunSummary};

//! Output sink traits and error types
//!
//! Reporting and alerting collaborators receive exactly one `RunSummary` per
//! run through the `SummarySink` trait.

use crate::model::RunSummary;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for OutputError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(e: serde_json::Error) -> Self {
        Self::Format(e.to_string())
    }
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Consumer of finished run summaries
///
/// Sinks are called once per run after the run reached its terminal state. A
/// failing sink is logged by the caller and never changes the run's outcome.
pub trait SummarySink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Receives the summary of a finished run
    fn emit(&self, summary: &RunSummary) -> OutputResult<()>;
}

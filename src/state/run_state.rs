/// Run state definitions for the crawl run state machine
///
/// A run moves `Initializing -> Fetching -> Finalizing` and ends in one of the
/// terminal states. There is no whole-run failure state: per-URL failures are
/// captured in the run summary instead.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle state of one crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    // ===== Active States =====
    /// Resolving targets and loading the checkpoint
    Initializing,

    /// Worker pool is draining the pending queue
    Fetching,

    /// All pending URLs are settled; summary is being assembled
    Finalizing,

    // ===== Terminal States =====
    /// Every target was committed
    Completed,

    /// Some targets failed terminally; the run can be resumed for them
    CompletedWithFailures,

    /// The run was stopped cooperatively before draining its queue
    Interrupted,
}

impl RunState {
    pub const ALL: [RunState; 6] = [
        Self::Initializing,
        Self::Fetching,
        Self::Finalizing,
        Self::Completed,
        Self::CompletedWithFailures,
        Self::Interrupted,
    ];

    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithFailures | Self::Interrupted
        )
    }

    /// Returns true if a later invocation may resume this run's checkpoint
    ///
    /// Only a clean completion closes a run for good. A run found in an
    /// active state was interrupted by a crash.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::Fetching)
                | (Self::Fetching, Self::Finalizing)
                | (Self::Finalizing, Self::Completed)
                | (Self::Finalizing, Self::CompletedWithFailures)
                | (Self::Finalizing, Self::Interrupted)
        )
    }

    /// Converts the run state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Fetching => "fetching",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::CompletedWithFailures => "completed_with_failures",
            Self::Interrupted => "interrupted",
        }
    }

    /// Parses a run state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.to_db_string() == s)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

//! Job status value object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Thumbnail job status.
///
/// Jobs move `pending/queued -> processing -> {completed | failed}` and never
/// backwards. `pending` and `queued` are both entry states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record created, not yet handed to the queue.
    #[default]
    Pending,
    /// Handed to the work queue.
    Queued,
    /// A worker holds the owner's lock and is rendering.
    Processing,
    /// Thumbnail produced.
    Completed,
    /// Rendering failed; terminal.
    Failed,
}

impl JobStatus {
    /// Position in the forward order of the state machine.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Pending | Self::Queued => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Checks if the status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Checks if a worker may start rendering a job in this status.
    #[must_use]
    pub const fn is_processable(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks if moving to `next` keeps the state machine moving forward.
    ///
    /// `processing -> processing` is accepted so that a redelivered job whose
    /// previous worker died mid-render can be picked up again.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Queued | Self::Processing | Self::Failed)
            | (Self::Queued, Self::Processing | Self::Failed)
            | (Self::Processing, Self::Processing | Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// All possible statuses.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Pending,
            Self::Queued,
            Self::Processing,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status: {s}"))
    }
}

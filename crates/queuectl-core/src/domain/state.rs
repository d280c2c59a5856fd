//! Job state machine and priority bands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Job state.
///
/// State transitions:
/// - Pending -> Processing (claim)
/// - Processing -> Completed (exit 0)
/// - Processing -> Pending (failure with retries left, `next_retry_at` set)
/// - Processing -> Dead (retries exhausted)
/// - Processing -> Pending (stale lock released by an operator)
/// - Dead -> Pending (DLQ reinstatement, attempts reset)
///
/// `Failed` is recognised for listing and counting but no transition produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| QueueError::CorruptRecord(format!("unknown job state {s:?}")))
    }
}

/// Priority band. Claims serve `High` before `Medium` before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Integer rank persisted in the `priority` column; larger is served first.
    pub fn rank(self) -> i64 {
        match self {
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }

    pub fn from_rank(rank: i64) -> Result<Self, QueueError> {
        match rank {
            2 => Ok(Priority::High),
            1 => Ok(Priority::Medium),
            0 => Ok(Priority::Low),
            other => Err(QueueError::CorruptRecord(format!(
                "unknown priority rank {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

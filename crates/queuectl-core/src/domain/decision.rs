//! Decision model: the state transition chosen for a finished execution.

use chrono::{DateTime, Utc};

use super::JobState;

/// Output of [`RetryPolicy::decide`](crate::queue::RetryPolicy::decide).
///
/// Pure data: the store applies it to the job row (lock fields are always cleared).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub next_state: JobState,
    pub next_attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Decision {
    pub fn is_retry(&self) -> bool {
        self.next_state == JobState::Pending
    }
}

//! Worker registration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::WorkerId;

/// A worker loop announced by `WorkerPool` (process id plus last heartbeat).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
}

impl WorkerRecord {
    /// Heartbeat at or after `seen_since`.
    pub fn is_live(&self, seen_since: DateTime<Utc>) -> bool {
        self.heartbeat_at >= seen_since
    }
}

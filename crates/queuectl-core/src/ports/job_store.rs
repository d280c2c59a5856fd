//! JobStore port - ジョブの正本（source of truth）
//!
//! # 設計原則
//! - `claim` だけが行をまたいだ排他を必要とする（select と update は不可分）
//! - それ以外の操作は主キー 1 行に対する条件付き更新
//! - 状態遷移はすべてこの trait を通る

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExecOutcome, Job, JobId, JobState, NewJob, WorkerId};
use crate::error::QueueError;
use crate::observability::StateSummary;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a `pending` job. `DuplicateId` if the id is taken.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError>;

    /// Atomically take the best eligible job (priority desc, then FIFO) and move it
    /// to `processing` under `worker`. `None` when nothing is eligible.
    async fn claim(&self, worker: &WorkerId) -> Result<Option<Job>, QueueError>;

    /// `processing -> completed`, lock cleared.
    ///
    /// Only the worker holding the lock may report: `LockLost` when the job is
    /// `processing` under another worker, `NotProcessing` otherwise.
    async fn mark_completed(&self, id: &JobId, worker: &WorkerId) -> Result<(), QueueError>;

    /// Apply the retry policy to a failed execution. Returns the new state
    /// (`pending` with a retry scheduled, or `dead`). Same ownership rule as
    /// `mark_completed`.
    async fn mark_failed(
        &self,
        id: &JobId,
        worker: &WorkerId,
        outcome: &ExecOutcome,
    ) -> Result<JobState, QueueError>;

    /// `dead -> pending` with attempts reset. `NotFound` / `NotDead` otherwise,
    /// with no mutation.
    async fn reinstate(&self, id: &JobId) -> Result<(), QueueError>;

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError>;

    /// Jobs in creation order, optionally filtered by state. At most `limit`
    /// jobs (the oldest ones) when set.
    async fn list_by_state(
        &self,
        state: Option<JobState>,
        limit: Option<u32>,
    ) -> Result<Vec<Job>, QueueError>;

    /// Return every `processing` job locked before `stale_before` to `pending`.
    /// Returns how many jobs were released.
    async fn release_stale_locks(&self, stale_before: DateTime<Utc>) -> Result<u64, QueueError>;

    async fn summary_by_state(&self) -> Result<StateSummary, QueueError>;
}

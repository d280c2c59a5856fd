//! WorkerRegistry port - 稼働中ワーカーの登録簿
//!
//! `WorkerPool` が起動時に登録し、定期的に heartbeat を打ち、停止時に削除する。
//! プロセスがクラッシュした場合は行が残るので、生死は heartbeat の新しさで判断する。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{WorkerId, WorkerRecord};
use crate::error::QueueError;

#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Record `worker` as running in process `pid` (replaces an older row with the same id).
    async fn register(&self, worker: &WorkerId, pid: u32) -> Result<(), QueueError>;

    async fn heartbeat(&self, workers: &[WorkerId]) -> Result<(), QueueError>;

    async fn deregister(&self, workers: &[WorkerId]) -> Result<(), QueueError>;

    /// Workers whose last heartbeat is at or after `seen_since`, ordered by id.
    async fn live_workers(
        &self,
        seen_since: DateTime<Utc>,
    ) -> Result<Vec<WorkerRecord>, QueueError>;
}

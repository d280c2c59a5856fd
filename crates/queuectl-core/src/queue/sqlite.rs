//! SQLite store implementation (durable).
//!
//! # 設計原則
//! - `claim` は 1 本の `UPDATE … WHERE id = (SELECT … LIMIT 1) AND state = 'pending' RETURNING …`
//!   SQLite は書き込みを直列化するので、select と update の間に他の claim は割り込めない
//! - complete / fail / reinstate は主キー + 期待状態を条件にした更新（行単位の原子性）
//! - 時刻は Clock から取り、ミリ秒の整数で保存する

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use super::RetryPolicy;
use crate::config::DatabaseConfig;
use crate::domain::{
    ExecOutcome, Job, JobId, JobState, NewJob, Priority, WorkerId, WorkerRecord,
};
use crate::error::QueueError;
use crate::observability::StateSummary;
use crate::ports::{Clock, ConfigStore, JobStore, WorkerRegistry};

const JOB_COLUMNS: &str = "id, command, priority, state, attempts, max_retries, \
     created_at, updated_at, locked_by, locked_at, next_retry_at";

/// How long a connection waits on a locked database before failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the database and apply migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, QueueError> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    debug!(url = %config.url, "job database ready");
    Ok(pool)
}

/// Row shape of the `jobs` table.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    command: String,
    priority: i64,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: i64,
    updated_at: i64,
    locked_by: Option<String>,
    locked_at: Option<i64>,
    next_retry_at: Option<i64>,
}

impl TryFrom<JobRow> for Job {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::from_trusted(row.id),
            command: row.command,
            priority: Priority::from_rank(row.priority)?,
            state: row.state.parse()?,
            attempts: to_u32("attempts", row.attempts)?,
            max_retries: to_u32("max_retries", row.max_retries)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            locked_by: row.locked_by.map(WorkerId::new),
            locked_at: row.locked_at.map(from_millis).transpose()?,
            next_retry_at: row.next_retry_at.map(from_millis).transpose()?,
        })
    }
}

fn to_u32(column: &str, value: i64) -> Result<u32, QueueError> {
    u32::try_from(value)
        .map_err(|_| QueueError::CorruptRecord(format!("{column} out of range: {value}")))
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, QueueError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| QueueError::CorruptRecord(format!("timestamp out of range: {millis}")))
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// SQLite-backed job store.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn fetch(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    /// Explain why a report from `worker` touched no row.
    async fn report_rejection(&self, id: &JobId, worker: &WorkerId) -> QueueError {
        let job = match self.fetch(id).await {
            Ok(Some(job)) => job,
            Ok(None) => return QueueError::NotFound(id.clone()),
            Err(e) => return e,
        };
        match job.ensure_held_by(worker) {
            Err(e) => e,
            // held again by the same worker after a concurrent release + claim
            Ok(()) => QueueError::NotProcessing {
                id: id.clone(),
                state: job.state,
            },
        }
    }

    /// Explain why a conditional update touched no row.
    async fn state_of(&self, id: &JobId) -> Result<JobState, QueueError> {
        let state: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match state {
            Some(state) => state.parse(),
            None => Err(QueueError::NotFound(id.clone())),
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let now = to_millis(self.clock.now());
        let result = sqlx::query(
            r"
            INSERT INTO jobs (id, command, priority, state, attempts, max_retries, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', 0, ?, ?, ?)
            ",
        )
        .bind(job.id().as_str())
        .bind(job.command())
        .bind(job.priority().rank())
        .bind(i64::from(job.max_retries()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(job.id = %job.id(), "job enqueued");
                Ok(job.id().clone())
            }
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(QueueError::DuplicateId(job.id().clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn claim(&self, worker: &WorkerId) -> Result<Option<Job>, QueueError> {
        let now = to_millis(self.clock.now());
        let sql = format!(
            r"
            UPDATE jobs
            SET state = 'processing', locked_by = ?, locked_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= ?)
                ORDER BY priority DESC, created_at ASC, rowid ASC
                LIMIT 1
            )
              AND state = 'pending'
            RETURNING {JOB_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(worker.as_str())
            .bind(now)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn mark_completed(&self, id: &JobId, worker: &WorkerId) -> Result<(), QueueError> {
        let now = to_millis(self.clock.now());
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'completed', locked_by = NULL, locked_at = NULL,
                next_retry_at = NULL, updated_at = ?
            WHERE id = ? AND state = 'processing' AND locked_by = ?
            ",
        )
        .bind(now)
        .bind(id.as_str())
        .bind(worker.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.report_rejection(id, worker).await);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        worker: &WorkerId,
        outcome: &ExecOutcome,
    ) -> Result<JobState, QueueError> {
        let job = self
            .fetch(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;
        job.ensure_held_by(worker)?;

        let now = self.clock.now();
        let decision = self.retry_policy.decide(&job, outcome, now);

        // Guarded on the attempts value the decision was computed from, so a
        // concurrent release/claim cannot be overwritten with a stale decision.
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = ?, attempts = ?, next_retry_at = ?,
                locked_by = NULL, locked_at = NULL, updated_at = ?
            WHERE id = ? AND state = 'processing' AND locked_by = ? AND attempts = ?
            ",
        )
        .bind(decision.next_state.as_str())
        .bind(i64::from(decision.next_attempts))
        .bind(decision.next_retry_at.map(to_millis))
        .bind(to_millis(now))
        .bind(id.as_str())
        .bind(worker.as_str())
        .bind(i64::from(job.attempts))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.report_rejection(id, worker).await);
        }
        Ok(decision.next_state)
    }

    async fn reinstate(&self, id: &JobId) -> Result<(), QueueError> {
        let now = to_millis(self.clock.now());
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'pending', attempts = 0, next_retry_at = NULL,
                locked_by = NULL, locked_at = NULL, updated_at = ?
            WHERE id = ? AND state = 'dead'
            ",
        )
        .bind(now)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let state = self.state_of(id).await?;
            return Err(QueueError::NotDead {
                id: id.clone(),
                state,
            });
        }
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        self.fetch(id).await
    }

    async fn list_by_state(
        &self,
        state: Option<JobState>,
        limit: Option<u32>,
    ) -> Result<Vec<Job>, QueueError> {
        // LIMIT -1 は無制限
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE (?1 IS NULL OR state = ?1) \
             ORDER BY created_at ASC, rowid ASC \
             LIMIT ?2"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(state.map(JobState::as_str))
            .bind(limit.map_or(-1, i64::from))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn release_stale_locks(&self, stale_before: DateTime<Utc>) -> Result<u64, QueueError> {
        let now = to_millis(self.clock.now());
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'pending', locked_by = NULL, locked_at = NULL, updated_at = ?
            WHERE state = 'processing' AND locked_at < ?
            ",
        )
        .bind(now)
        .bind(to_millis(stale_before))
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            info!(released, %stale_before, "released stale job locks");
        }
        Ok(released)
    }

    async fn summary_by_state(&self) -> Result<StateSummary, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut summary = StateSummary::default();
        for (state, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            summary.add(state.parse()?, count);
        }
        Ok(summary)
    }
}

/// Key-value configuration records in the `config` table.
#[derive(Debug, Clone)]
pub struct SqliteConfigStore {
    pool: SqlitePool,
}

impl SqliteConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get(&self, key: &str) -> Result<Option<String>, QueueError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        sqlx::query(
            r"
            INSERT INTO config (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            ",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, String)>, QueueError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Worker records in the `workers` table.
#[derive(Clone)]
pub struct SqliteWorkerRegistry {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteWorkerRegistry {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl WorkerRegistry for SqliteWorkerRegistry {
    async fn register(&self, worker: &WorkerId, pid: u32) -> Result<(), QueueError> {
        let now = to_millis(self.clock.now());
        sqlx::query(
            r"
            INSERT INTO workers (id, pid, started_at, heartbeat_at) VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE
            SET pid = excluded.pid, started_at = excluded.started_at,
                heartbeat_at = excluded.heartbeat_at
            ",
        )
        .bind(worker.as_str())
        .bind(i64::from(pid))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        debug!(worker.id = %worker, pid, "worker registered");
        Ok(())
    }

    async fn heartbeat(&self, workers: &[WorkerId]) -> Result<(), QueueError> {
        let now = to_millis(self.clock.now());
        let mut tx = self.pool.begin().await?;
        for worker in workers {
            sqlx::query("UPDATE workers SET heartbeat_at = ? WHERE id = ?")
                .bind(now)
                .bind(worker.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn deregister(&self, workers: &[WorkerId]) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        for worker in workers {
            sqlx::query("DELETE FROM workers WHERE id = ?")
                .bind(worker.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn live_workers(
        &self,
        seen_since: DateTime<Utc>,
    ) -> Result<Vec<WorkerRecord>, QueueError> {
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            "SELECT id, pid, started_at, heartbeat_at FROM workers \
             WHERE heartbeat_at >= ? ORDER BY id",
        )
        .bind(to_millis(seen_since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, pid, started_at, heartbeat_at)| {
                Ok(WorkerRecord {
                    id: WorkerId::new(id),
                    pid: to_u32("pid", pid)?,
                    started_at: from_millis(started_at)?,
                    heartbeat_at: from_millis(heartbeat_at)?,
                })
            })
            .collect()
    }
}

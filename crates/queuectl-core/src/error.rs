use thiserror::Error;

use crate::domain::{JobId, JobState, WorkerId};

/// Errors surfaced by the store, the DLQ façade and configuration handling.
///
/// Execution failures are deliberately absent: a non-zero exit is an
/// [`ExecOutcome`](crate::domain::ExecOutcome) that feeds the retry policy.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Bad job submission. Never reaches the store.
    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("job {0} already exists")]
    DuplicateId(JobId),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id} is not in the dead letter queue (state={state})")]
    NotDead { id: JobId, state: JobState },

    #[error("job {id} is not being processed (state={state})")]
    NotProcessing { id: JobId, state: JobState },

    /// The job is `processing`, but under a different worker (its lock was
    /// released and the job claimed again).
    #[error("job {id} is no longer held by {worker}")]
    LockLost { id: JobId, worker: WorkerId },

    /// The persistent store could not be reached or the statement failed.
    /// Callers retry with backoff; the operation must not be dropped.
    #[error("job store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt job record: {0}")]
    CorruptRecord(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Transient store failure that the caller should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::StoreUnavailable(_))
    }
}

impl From<config::ConfigError> for QueueError {
    fn from(err: config::ConfigError) -> Self {
        QueueError::Config(err.to_string())
    }
}

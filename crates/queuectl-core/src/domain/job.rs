//! Job record and the submission boundary.
//!
//! - `JobSubmission`: loosely-typed JSON as the client sends it.
//! - `NewJob`: validated, strongly-typed; the only thing `JobStore::enqueue` accepts.
//! - `Job`: the persisted record (single source of truth for state).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Decision, JobId, JobState, Priority, WorkerId};
use crate::config::QueueSettings;
use crate::error::QueueError;
use crate::ports::IdGenerator;

/// A job as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub priority: Priority,
    pub state: JobState,

    /// Failed executions so far. Reset to 0 only by DLQ reinstatement.
    pub attempts: u32,
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set only while `state == Processing`.
    pub locked_by: Option<WorkerId>,
    pub locked_at: Option<DateTime<Utc>>,

    /// Not claimable before this instant, even when `Pending`.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn from_new(new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            command: new.command,
            priority: new.priority,
            state: JobState::Pending,
            attempts: 0,
            max_retries: new.max_retries,
            created_at: now,
            updated_at: now,
            locked_by: None,
            locked_at: None,
            next_retry_at: None,
        }
    }

    /// Claimable at `now`?
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// `Ok` only while `processing` under `worker`.
    pub(crate) fn ensure_held_by(&self, worker: &WorkerId) -> Result<(), QueueError> {
        if self.state != JobState::Processing {
            return Err(QueueError::NotProcessing {
                id: self.id.clone(),
                state: self.state,
            });
        }
        if self.locked_by.as_ref() != Some(worker) {
            return Err(QueueError::LockLost {
                id: self.id.clone(),
                worker: worker.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn claim(&mut self, worker: &WorkerId, now: DateTime<Utc>) {
        self.state = JobState::Processing;
        self.locked_by = Some(worker.clone());
        self.locked_at = Some(now);
        self.updated_at = now;
    }

    pub(crate) fn apply(&mut self, decision: &Decision, now: DateTime<Utc>) {
        self.state = decision.next_state;
        self.attempts = decision.next_attempts;
        self.next_retry_at = decision.next_retry_at;
        self.release_lock();
        self.updated_at = now;
    }

    pub(crate) fn reinstate(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Pending;
        self.attempts = 0;
        self.next_retry_at = None;
        self.release_lock();
        self.updated_at = now;
    }

    pub(crate) fn release_stale(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Pending;
        self.release_lock();
        self.updated_at = now;
    }

    fn release_lock(&mut self) {
        self.locked_by = None;
        self.locked_at = None;
    }
}

/// A validated job, ready for `JobStore::enqueue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    id: JobId,
    command: String,
    priority: Priority,
    max_retries: u32,
}

impl NewJob {
    /// Fails with `InvalidSpec` when `command` is empty or whitespace only.
    pub fn new(id: JobId, command: impl Into<String>) -> Result<Self, QueueError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(QueueError::InvalidSpec(format!(
                "job {id}: command must not be empty"
            )));
        }
        Ok(Self {
            id,
            command,
            priority: Priority::default(),
            max_retries: QueueSettings::DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Job submission payload as received from a client.
///
/// ```json
/// {"id": "t1", "command": "exit 1", "priority": "high", "max_retries": 2}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSubmission {
    #[serde(default)]
    pub id: Option<String>,
    pub command: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl JobSubmission {
    /// Parse a raw JSON document. Every rejection names the offending field.
    pub fn from_json(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::InvalidSpec(e.to_string()))
    }

    /// Validate and convert. Missing id → generated, missing max_retries → configured default.
    pub fn into_new_job(
        self,
        defaults: &QueueSettings,
        ids: &dyn IdGenerator,
    ) -> Result<NewJob, QueueError> {
        let id = match self.id {
            Some(raw) => JobId::parse(raw)?,
            None => ids.generate_job_id(),
        };
        let job = NewJob::new(id, self.command)?
            .with_priority(self.priority.unwrap_or_default())
            .with_max_retries(self.max_retries.unwrap_or(defaults.max_retries));
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::TimeZone;

    fn ids() -> UlidGenerator<FixedClock> {
        UlidGenerator::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn submission_with_all_fields() {
        let sub = JobSubmission::from_json(
            r#"{"id":"t1","command":"exit 1","priority":"high","max_retries":2}"#,
        )
        .unwrap();
        let job = sub.into_new_job(&QueueSettings::default(), &ids()).unwrap();
        assert_eq!(job.id().as_str(), "t1");
        assert_eq!(job.command(), "exit 1");
        assert_eq!(job.priority(), Priority::High);
        assert_eq!(job.max_retries(), 2);
    }

    #[test]
    fn submission_defaults_come_from_settings() {
        let settings = QueueSettings {
            max_retries: 7,
            ..QueueSettings::default()
        };
        let sub = JobSubmission::from_json(r#"{"command":"echo hi"}"#).unwrap();
        let job = sub.into_new_job(&settings, &ids()).unwrap();
        assert!(job.id().as_str().starts_with("job-"));
        assert_eq!(job.priority(), Priority::Medium);
        assert_eq!(job.max_retries(), 7);
    }

    #[test]
    fn empty_command_is_invalid() {
        let sub = JobSubmission::from_json(r#"{"id":"x","command":"   "}"#).unwrap();
        let err = sub.into_new_job(&QueueSettings::default(), &ids()).unwrap_err();
        assert!(matches!(err, QueueError::InvalidSpec(msg) if msg.contains("command")));
    }

    #[test]
    fn malformed_payloads_fail_fast() {
        for raw in [
            "not json",
            r#"{"id":"x"}"#,
            r#"{"command":"true","priority":"urgent"}"#,
            r#"{"command":"true","max_retries":-1}"#,
            r#"{"command":"true","retries":3}"#,
        ] {
            let err = JobSubmission::from_json(raw).unwrap_err();
            assert!(matches!(err, QueueError::InvalidSpec(_)), "{raw}");
        }
    }

    #[test]
    fn eligibility_respects_next_retry_at() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let new = NewJob::new(JobId::parse("a").unwrap(), "true").unwrap();
        let mut job = Job::from_new(new, now);
        assert!(job.is_eligible(now));

        job.next_retry_at = Some(now + chrono::Duration::seconds(2));
        assert!(!job.is_eligible(now));
        assert!(job.is_eligible(now + chrono::Duration::seconds(2)));

        job.claim(&WorkerId::new("w"), now);
        assert!(!job.is_eligible(now + chrono::Duration::seconds(5)));
    }
}

//! In-memory store implementation.
//!
//! Not durable. Used by tests and by embedders that do not need persistence.
//! Every operation runs inside one critical section, which makes `claim` trivially
//! indivisible.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::RetryPolicy;
use crate::domain::{ExecOutcome, Job, JobId, JobState, NewJob, WorkerId, WorkerRecord};
use crate::error::QueueError;
use crate::observability::StateSummary;
use crate::ports::{Clock, ConfigStore, JobStore, WorkerRegistry};

#[derive(Debug)]
struct Entry {
    /// Insertion order; FIFO tie-break when `created_at` is equal.
    seq: u64,
    job: Job,
}

#[derive(Debug, Default)]
struct InMemoryState {
    entries: HashMap<JobId, Entry>,
    next_seq: u64,
}

impl InMemoryState {
    fn entry(&self, id: &JobId) -> Result<&Entry, QueueError> {
        self.entries
            .get(id)
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    fn job_mut(&mut self, id: &JobId) -> Result<&mut Job, QueueError> {
        self.entries
            .get_mut(id)
            .map(|entry| &mut entry.job)
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    /// Best eligible job: highest priority, then oldest, then first inserted.
    fn next_eligible(&self, now: DateTime<Utc>) -> Option<JobId> {
        self.entries
            .values()
            .filter(|entry| entry.job.is_eligible(now))
            .max_by_key(|entry| {
                (
                    entry.job.priority.rank(),
                    Reverse(entry.job.created_at),
                    Reverse(entry.seq),
                )
            })
            .map(|entry| entry.job.id.clone())
    }
}

/// In-memory job store.
#[derive(Clone)]
pub struct InMemoryJobStore {
    state: Arc<Mutex<InMemoryState>>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
            clock,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.entries.contains_key(job.id()) {
            return Err(QueueError::DuplicateId(job.id().clone()));
        }

        let job = Job::from_new(job, now);
        let id = job.id.clone();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(id.clone(), Entry { seq, job });
        debug!(job.id = %id, "job enqueued");
        Ok(id)
    }

    async fn claim(&self, worker: &WorkerId) -> Result<Option<Job>, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(id) = state.next_eligible(now) else {
            return Ok(None);
        };
        let job = state.job_mut(&id)?;
        job.claim(worker, now);
        Ok(Some(job.clone()))
    }

    async fn mark_completed(&self, id: &JobId, worker: &WorkerId) -> Result<(), QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let job = state.job_mut(id)?;
        job.ensure_held_by(worker)?;
        let decision = self.retry_policy.decide(job, &ExecOutcome::exited(0), now);
        job.apply(&decision, now);
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        worker: &WorkerId,
        outcome: &ExecOutcome,
    ) -> Result<JobState, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let job = state.job_mut(id)?;
        job.ensure_held_by(worker)?;
        let decision = self.retry_policy.decide(job, outcome, now);
        job.apply(&decision, now);
        Ok(decision.next_state)
    }

    async fn reinstate(&self, id: &JobId) -> Result<(), QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let job = state.job_mut(id)?;
        if job.state != JobState::Dead {
            return Err(QueueError::NotDead {
                id: id.clone(),
                state: job.state,
            });
        }
        job.reinstate(now);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.entry(id).ok().map(|entry| entry.job.clone()))
    }

    async fn list_by_state(
        &self,
        filter: Option<JobState>,
        limit: Option<u32>,
    ) -> Result<Vec<Job>, QueueError> {
        let state = self.state.lock().await;
        let mut entries: Vec<&Entry> = state
            .entries
            .values()
            .filter(|entry| filter.is_none_or(|s| entry.job.state == s))
            .collect();
        entries.sort_by_key(|entry| (entry.job.created_at, entry.seq));
        let limit = limit.map_or(usize::MAX, |n| n as usize);
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|entry| entry.job.clone())
            .collect())
    }

    async fn release_stale_locks(&self, stale_before: DateTime<Utc>) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut released = 0;
        for entry in state.entries.values_mut() {
            let job = &mut entry.job;
            if job.state == JobState::Processing && job.locked_at.is_some_and(|at| at < stale_before)
            {
                job.release_stale(now);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn summary_by_state(&self) -> Result<StateSummary, QueueError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .values()
            .map(|entry| entry.job.state)
            .collect())
    }
}

/// In-memory key-value configuration records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    records: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<String>, QueueError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        self.records
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, String)>, QueueError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// In-memory worker registry.
#[derive(Clone)]
pub struct InMemoryWorkerRegistry {
    records: Arc<Mutex<BTreeMap<WorkerId, WorkerRecord>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryWorkerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
            clock,
        }
    }
}

#[async_trait]
impl WorkerRegistry for InMemoryWorkerRegistry {
    async fn register(&self, worker: &WorkerId, pid: u32) -> Result<(), QueueError> {
        let now = self.clock.now();
        let record = WorkerRecord {
            id: worker.clone(),
            pid,
            started_at: now,
            heartbeat_at: now,
        };
        self.records.lock().await.insert(worker.clone(), record);
        Ok(())
    }

    async fn heartbeat(&self, workers: &[WorkerId]) -> Result<(), QueueError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        for worker in workers {
            if let Some(record) = records.get_mut(worker) {
                record.heartbeat_at = now;
            }
        }
        Ok(())
    }

    async fn deregister(&self, workers: &[WorkerId]) -> Result<(), QueueError> {
        let mut records = self.records.lock().await;
        for worker in workers {
            records.remove(worker);
        }
        Ok(())
    }

    async fn live_workers(
        &self,
        seen_since: DateTime<Utc>,
    ) -> Result<Vec<WorkerRecord>, QueueError> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|record| record.is_live(seen_since))
            .cloned()
            .collect())
    }
}

//! SqliteJobStore against a real database file.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use queuectl_core::config::DatabaseConfig;
use queuectl_core::ports::{Clock, ConfigStore, FixedClock, JobStore, WorkerRegistry};
use queuectl_core::queue::{SqliteConfigStore, SqliteJobStore, SqliteWorkerRegistry, connect};
use queuectl_core::{DlqManager, ExecOutcome, JobId, JobState, NewJob, Priority, QueueError, WorkerId};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    clock: FixedClock,
    store: Arc<SqliteJobStore>,
    pool: sqlx::SqlitePool,
}

async fn harness(max_connections: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let pool = connect(&DatabaseConfig {
        url,
        max_connections,
    })
    .await
    .unwrap();
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let store = Arc::new(SqliteJobStore::new(pool.clone(), Arc::new(clock.clone())));
    Harness {
        _dir: dir,
        clock,
        store,
        pool,
    }
}

fn id(raw: &str) -> JobId {
    JobId::parse(raw).unwrap()
}

fn job(raw: &str, command: &str) -> NewJob {
    NewJob::new(id(raw), command).unwrap()
}

#[tokio::test]
async fn enqueue_rejects_duplicate_ids() {
    let h = harness(1).await;
    h.store.enqueue(job("a", "true")).await.unwrap();

    let err = h.store.enqueue(job("a", "false")).await.unwrap_err();
    assert!(matches!(err, QueueError::DuplicateId(dup) if dup == id("a")));

    let stored = h.store.get(&id("a")).await.unwrap().unwrap();
    assert_eq!(stored.command, "true");
    assert_eq!(stored.state, JobState::Pending);
}

#[tokio::test]
async fn concurrent_claims_hand_out_each_job_once() {
    let h = harness(8).await;
    for i in 0..100 {
        h.store.enqueue(job(&format!("j{i:03}"), "true")).await.unwrap();
    }

    let mut tasks = Vec::new();
    for w in 0..8 {
        let store = Arc::clone(&h.store);
        tasks.push(tokio::spawn(async move {
            let worker = WorkerId::new(format!("w{w}"));
            let mut claimed = Vec::new();
            while let Some(job) = store.claim(&worker).await.unwrap() {
                assert_eq!(job.locked_by.as_ref(), Some(&worker));
                claimed.push(job.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for job_id in task.await.unwrap() {
            assert!(seen.insert(job_id.clone()), "{job_id} claimed twice");
        }
    }
    assert_eq!(seen.len(), 100);
    assert_eq!(h.store.summary_by_state().await.unwrap().processing, 100);
}

#[tokio::test]
async fn claim_serves_priority_then_fifo() {
    let h = harness(1).await;
    h.store
        .enqueue(job("low", "true").with_priority(Priority::Low))
        .await
        .unwrap();
    h.clock.advance(TimeDelta::milliseconds(1));
    h.store.enqueue(job("med-1", "true")).await.unwrap();
    h.clock.advance(TimeDelta::milliseconds(1));
    h.store
        .enqueue(job("high", "true").with_priority(Priority::High))
        .await
        .unwrap();
    h.clock.advance(TimeDelta::milliseconds(1));
    h.store.enqueue(job("med-2", "true")).await.unwrap();

    let worker = WorkerId::new("w");
    let mut order = Vec::new();
    while let Some(job) = h.store.claim(&worker).await.unwrap() {
        order.push(job.id.to_string());
    }
    assert_eq!(order, ["high", "med-1", "med-2", "low"]);
}

#[tokio::test]
async fn failing_job_backs_off_then_lands_in_dlq() {
    let h = harness(1).await;
    let start = h.clock.now();
    h.store
        .enqueue(job("t1", "exit 1").with_max_retries(2))
        .await
        .unwrap();
    let worker = WorkerId::new("w");
    let failed = ExecOutcome::exited(1);

    let claimed = h.store.claim(&worker).await.unwrap().unwrap();
    let state = h.store.mark_failed(&claimed.id, &worker, &failed).await.unwrap();
    assert_eq!(state, JobState::Pending);

    let t1 = h.store.get(&id("t1")).await.unwrap().unwrap();
    assert_eq!(t1.attempts, 1);
    assert_eq!(t1.next_retry_at, Some(start + TimeDelta::seconds(2)));
    assert!(t1.locked_by.is_none() && t1.locked_at.is_none());

    h.clock.advance(TimeDelta::milliseconds(1999));
    assert!(h.store.claim(&worker).await.unwrap().is_none());
    h.clock.advance(TimeDelta::milliseconds(1));
    let claimed = h.store.claim(&worker).await.unwrap().unwrap();
    let state = h.store.mark_failed(&claimed.id, &worker, &failed).await.unwrap();
    assert_eq!(state, JobState::Dead);

    let t1 = h.store.get(&id("t1")).await.unwrap().unwrap();
    assert_eq!(t1.state, JobState::Dead);
    assert_eq!(t1.attempts, 2);

    let dead = DlqManager::new(h.store.clone()).list().await.unwrap();
    assert_eq!(dead.len(), 1);
}

#[tokio::test]
async fn backoff_doubles_between_attempts() {
    let h = harness(1).await;
    h.store
        .enqueue(job("b", "exit 1").with_max_retries(5))
        .await
        .unwrap();
    let worker = WorkerId::new("w");

    let mut deltas = Vec::new();
    for _ in 0..3 {
        let claimed = h.store.claim(&worker).await.unwrap().unwrap();
        let failed_at = h.clock.now();
        h.store
            .mark_failed(&claimed.id, &worker, &ExecOutcome::exited(1))
            .await
            .unwrap();
        let retry_at = h.store.get(&id("b")).await.unwrap().unwrap().next_retry_at.unwrap();
        deltas.push((retry_at - failed_at).num_seconds());
        h.clock.set(retry_at);
    }
    assert_eq!(deltas, [2, 4, 8]);
}

#[tokio::test]
async fn completion_clears_the_lock() {
    let h = harness(1).await;
    h.store.enqueue(job("ok", "true")).await.unwrap();
    let worker = WorkerId::new("w");
    let claimed = h.store.claim(&worker).await.unwrap().unwrap();
    h.clock.advance(TimeDelta::seconds(1));
    h.store.mark_completed(&claimed.id, &worker).await.unwrap();

    let done = h.store.get(&id("ok")).await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert!(done.locked_by.is_none());
    assert_eq!(done.updated_at, h.clock.now());

    let err = h.store.mark_completed(&claimed.id, &worker).await.unwrap_err();
    assert!(matches!(err, QueueError::NotProcessing { state: JobState::Completed, .. }));
}

#[tokio::test]
async fn reinstate_only_touches_dead_jobs() {
    let h = harness(1).await;
    h.store
        .enqueue(job("d", "exit 1").with_max_retries(0))
        .await
        .unwrap();
    h.store.enqueue(job("p", "true")).await.unwrap();
    let worker = WorkerId::new("w");
    let claimed = h.store.claim(&worker).await.unwrap().unwrap();
    assert_eq!(claimed.id, id("d"));
    h.store
        .mark_failed(&claimed.id, &worker, &ExecOutcome::timed_out())
        .await
        .unwrap();

    let before = h.store.get(&id("p")).await.unwrap().unwrap();
    let err = h.store.reinstate(&id("p")).await.unwrap_err();
    assert!(matches!(err, QueueError::NotDead { state: JobState::Pending, .. }));
    assert_eq!(h.store.get(&id("p")).await.unwrap().unwrap(), before);

    let err = h.store.reinstate(&id("nope")).await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));

    h.store.reinstate(&id("d")).await.unwrap();
    let d = h.store.get(&id("d")).await.unwrap().unwrap();
    assert_eq!(d.state, JobState::Pending);
    assert_eq!(d.attempts, 0);
    assert!(d.next_retry_at.is_none());
}

#[tokio::test]
async fn stale_locks_are_released_by_cutoff() {
    let h = harness(1).await;
    h.store.enqueue(job("old", "sleep 100")).await.unwrap();
    h.store.enqueue(job("new", "sleep 100")).await.unwrap();
    let worker = WorkerId::new("crashed");

    h.store.claim(&worker).await.unwrap().unwrap();
    h.clock.advance(TimeDelta::seconds(600));
    h.store.claim(&worker).await.unwrap().unwrap();

    let cutoff = h.clock.now() - TimeDelta::seconds(300);
    assert_eq!(h.store.release_stale_locks(cutoff).await.unwrap(), 1);

    let old = h.store.get(&id("old")).await.unwrap().unwrap();
    assert_eq!(old.state, JobState::Pending);
    assert!(old.locked_by.is_none());
    let new = h.store.get(&id("new")).await.unwrap().unwrap();
    assert_eq!(new.state, JobState::Processing);
}

#[tokio::test]
async fn only_the_lock_holder_can_report() {
    let h = harness(1).await;
    h.store.enqueue(job("a", "true")).await.unwrap();
    let crashed = WorkerId::new("crashed");
    let current = WorkerId::new("current");

    h.store.claim(&crashed).await.unwrap().unwrap();
    h.clock.advance(TimeDelta::seconds(600));
    assert_eq!(h.store.release_stale_locks(h.clock.now()).await.unwrap(), 1);
    h.store.claim(&current).await.unwrap().unwrap();

    let err = h.store.mark_completed(&id("a"), &crashed).await.unwrap_err();
    assert!(matches!(&err, QueueError::LockLost { worker, .. } if *worker == crashed));
    let err = h
        .store
        .mark_failed(&id("a"), &crashed, &ExecOutcome::exited(1))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::LockLost { .. }));

    let a = h.store.get(&id("a")).await.unwrap().unwrap();
    assert_eq!(a.state, JobState::Processing);
    assert_eq!(a.locked_by.as_ref(), Some(&current));
    assert_eq!(a.attempts, 0);

    h.store.mark_completed(&id("a"), &current).await.unwrap();
    let err = h.store.mark_completed(&id("a"), &current).await.unwrap_err();
    assert!(matches!(err, QueueError::NotProcessing { state: JobState::Completed, .. }));
}

#[tokio::test]
async fn list_and_summary_reflect_states() {
    let h = harness(1).await;
    for raw in ["a", "b", "c"] {
        h.store.enqueue(job(raw, "true")).await.unwrap();
        h.clock.advance(TimeDelta::milliseconds(1));
    }
    let worker = WorkerId::new("w");
    let claimed = h.store.claim(&worker).await.unwrap().unwrap();
    h.store.mark_completed(&claimed.id, &worker).await.unwrap();

    let all: Vec<_> = h
        .store
        .list_by_state(None, None)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id.to_string())
        .collect();
    assert_eq!(all, ["a", "b", "c"]);

    let pending = h
        .store
        .list_by_state(Some(JobState::Pending), None)
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    let oldest = h.store.list_by_state(None, Some(2)).await.unwrap();
    let oldest: Vec<_> = oldest.into_iter().map(|j| j.id.to_string()).collect();
    assert_eq!(oldest, ["a", "b"]);
    let pending = h
        .store
        .list_by_state(Some(JobState::Pending), Some(1))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id("b"));

    let summary = h.store.summary_by_state().await.unwrap();
    assert_eq!(summary.pending, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.total(), 3);
}

#[tokio::test]
async fn config_records_persist_and_overwrite() {
    let h = harness(1).await;
    let config = SqliteConfigStore::new(h.pool.clone());

    assert_eq!(config.get("max-retries").await.unwrap(), None);
    config.set("max-retries", "5").await.unwrap();
    config.set("backoff-base", "3").await.unwrap();
    config.set("max-retries", "4").await.unwrap();

    assert_eq!(config.get("max-retries").await.unwrap().as_deref(), Some("4"));
    assert_eq!(
        config.entries().await.unwrap(),
        [
            ("backoff-base".to_string(), "3".to_string()),
            ("max-retries".to_string(), "4".to_string()),
        ]
    );
}

#[tokio::test]
async fn worker_rows_follow_register_heartbeat_and_deregister() {
    let h = harness(1).await;
    let registry = SqliteWorkerRegistry::new(h.pool.clone(), Arc::new(h.clock.clone()));
    let start = h.clock.now();
    let (a, b) = (WorkerId::new("worker-7-0"), WorkerId::new("worker-7-1"));

    registry.register(&a, 7).await.unwrap();
    registry.register(&b, 7).await.unwrap();
    h.clock.advance(TimeDelta::seconds(60));
    registry.heartbeat(std::slice::from_ref(&b)).await.unwrap();

    let all = registry.live_workers(start).await.unwrap();
    assert_eq!(all.iter().map(|w| w.id.as_str()).collect::<Vec<_>>(), ["worker-7-0", "worker-7-1"]);
    assert!(all.iter().all(|w| w.pid == 7 && w.started_at == start));

    let recent = registry.live_workers(start + TimeDelta::seconds(30)).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, b);
    assert_eq!(recent[0].heartbeat_at, h.clock.now());

    // 同じ id で再登録すると pid と started_at が置き換わる
    registry.register(&a, 9).await.unwrap();
    let recent = registry.live_workers(start + TimeDelta::seconds(30)).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].pid, 9);

    registry.deregister(&[a, b]).await.unwrap();
    assert!(registry.live_workers(start).await.unwrap().is_empty());
}

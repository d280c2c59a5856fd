//! WorkerPool - ワーカー群の起動と停止
//!
//! - `start(n)` で WorkerLoop を n 本 spawn
//! - `request_shutdown()` は新規 claim を止めるだけ（実行中のジョブは中断しない）
//! - `shutdown_and_join()` で全ワーカーの終了を待つ
//! - `start_registered(n)` は加えて workers テーブルに登録し、heartbeat を打ち続ける

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::worker_loop::{WorkerLoop, WorkerPhase};
use crate::config::QueueSettings;
use crate::domain::WorkerId;
use crate::error::QueueError;
use crate::ports::{CommandExecutor, JobStore, WorkerRegistry};

/// How often a registered pool refreshes `heartbeat_at`.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// A worker counts as live while its heartbeat is younger than this.
pub const LIVENESS_WINDOW: TimeDelta = TimeDelta::seconds(30);

/// Oldest heartbeat still considered live at `now`.
pub fn liveness_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - LIVENESS_WINDOW
}

struct Registration {
    registry: Arc<dyn WorkerRegistry>,
    heartbeat: JoinHandle<()>,
}

struct WorkerHandle {
    id: WorkerId,
    phase: watch::Receiver<WorkerPhase>,
    join: JoinHandle<()>,
}

/// Worker pool handle. Never touches job state itself.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<WorkerHandle>,
    registration: Option<Registration>,
}

impl WorkerPool {
    /// Spawn `count` workers with ids `worker-<pid>-<index>`.
    pub fn start(
        count: usize,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        settings: &QueueSettings,
    ) -> Self {
        Self::start_with_ids(
            (0..count).map(WorkerId::for_pool_member),
            store,
            executor,
            settings,
        )
    }

    pub fn start_with_ids(
        ids: impl IntoIterator<Item = WorkerId>,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        settings: &QueueSettings,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers: Vec<WorkerHandle> = ids
            .into_iter()
            .map(|id| {
                let worker = WorkerLoop::new(
                    id.clone(),
                    Arc::clone(&store),
                    Arc::clone(&executor),
                    settings,
                );
                let phase = worker.subscribe();
                let join = tokio::spawn(worker.run(shutdown_rx.clone()));
                WorkerHandle { id, phase, join }
            })
            .collect();

        info!(count = workers.len(), "worker pool started");
        Self {
            shutdown_tx,
            workers,
            registration: None,
        }
    }

    /// Like [`WorkerPool::start`], but every worker is recorded in `registry`
    /// under this process id and kept alive by a heartbeat task until
    /// [`WorkerPool::shutdown_and_join`] removes the records.
    pub async fn start_registered(
        count: usize,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        registry: Arc<dyn WorkerRegistry>,
        settings: &QueueSettings,
    ) -> Result<Self, QueueError> {
        let ids: Vec<WorkerId> = (0..count).map(WorkerId::for_pool_member).collect();
        let pid = std::process::id();
        for id in &ids {
            registry.register(id, pid).await?;
        }

        let mut pool = Self::start_with_ids(ids.clone(), store, executor, settings);
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&registry),
            ids,
            pool.shutdown_tx.subscribe(),
        ));
        pool.registration = Some(Registration {
            registry,
            heartbeat,
        });
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Current `(id, phase)` of every worker.
    pub fn workers(&self) -> Vec<(WorkerId, WorkerPhase)> {
        self.workers
            .iter()
            .map(|w| (w.id.clone(), *w.phase.borrow()))
            .collect()
    }

    /// Ask every worker to stop after its current cycle.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let mut ids = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            if let Err(e) = worker.join.await {
                error!(worker.id = %worker.id, error = %e, "worker task panicked");
            }
            ids.push(worker.id);
        }

        if let Some(registration) = self.registration {
            if let Err(e) = registration.heartbeat.await {
                error!(error = %e, "heartbeat task panicked");
            }
            // 残った行は heartbeat が古くなれば live から外れる
            if let Err(e) = registration.registry.deregister(&ids).await {
                warn!(error = %e, "failed to deregister workers");
            }
        }
        info!("worker pool stopped");
    }
}

async fn heartbeat_loop(
    registry: Arc<dyn WorkerRegistry>,
    ids: Vec<WorkerId>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 最初の tick は即時に完了する。登録直後なので飛ばす
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = registry.heartbeat(&ids).await {
                    warn!(error = %e, "worker heartbeat failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

//! WorkerLoop - ジョブ実行ループ
//!
//! # フロー
//! 1. JobStore::claim() で 1 件取得（なければ poll_interval 待機）
//! 2. CommandExecutor::execute() でコマンド実行（job_timeout で打ち切り）
//! 3. 成功なら mark_completed、失敗なら mark_failed（retry / dead は store 側で決定）
//!
//! shutdown はサイクルの境界でのみ確認する。実行中のジョブは必ず最後まで走って報告される。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::QueueSettings;
use crate::domain::{ExecOutcome, Job, JobId, JobState, WorkerId};
use crate::error::QueueError;
use crate::ports::{CommandExecutor, JobStore};

/// First wait before re-sending a report the store could not accept.
const REPORT_RETRY_INITIAL: Duration = Duration::from_millis(50);
const REPORT_RETRY_MAX: Duration = Duration::from_secs(30);

/// Where a worker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerPhase {
    Idle,
    Claiming,
    Executing,
    Reporting,
    ShuttingDown,
    Stopped,
}

impl WorkerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerPhase::Idle => "idle",
            WorkerPhase::Claiming => "claiming",
            WorkerPhase::Executing => "executing",
            WorkerPhase::Reporting => "reporting",
            WorkerPhase::ShuttingDown => "shutting_down",
            WorkerPhase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One worker: claims, executes and reports jobs until told to stop.
pub struct WorkerLoop {
    id: WorkerId,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    poll_interval: Duration,
    job_timeout: Duration,
    phase_tx: watch::Sender<WorkerPhase>,
}

impl WorkerLoop {
    pub fn new(
        id: WorkerId,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        settings: &QueueSettings,
    ) -> Self {
        let (phase_tx, _) = watch::channel(WorkerPhase::Idle);
        Self {
            id,
            store,
            executor,
            poll_interval: settings.poll_interval(),
            job_timeout: settings.job_timeout(),
            phase_tx,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Watch the worker's phase. Stays readable after the loop has stopped.
    pub fn subscribe(&self) -> watch::Receiver<WorkerPhase> {
        self.phase_tx.subscribe()
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let span = info_span!("worker", worker.id = %self.id);
        async {
            info!("worker started");
            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }

                match self.run_once().await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => error!(error = %e, "claim failed"),
                }

                if self.idle(&mut shutdown).await {
                    break;
                }
            }

            self.set_phase(WorkerPhase::ShuttingDown);
            info!("worker shutting down");
            self.set_phase(WorkerPhase::Stopped);
        }
        .instrument(span)
        .await
    }

    /// One cycle: claim a job and, if there was one, execute and report it.
    ///
    /// Returns `Ok(false)` when nothing was eligible. Only the claim can fail;
    /// report failures are retried inside the cycle.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        self.set_phase(WorkerPhase::Claiming);
        let claimed = self.store.claim(&self.id).await;
        let job = match claimed {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("no eligible job");
                self.set_phase(WorkerPhase::Idle);
                return Ok(false);
            }
            Err(e) => {
                self.set_phase(WorkerPhase::Idle);
                return Err(e);
            }
        };

        let span = info_span!("job", job.id = %job.id);
        self.process(job).instrument(span).await;
        self.set_phase(WorkerPhase::Idle);
        Ok(true)
    }

    async fn process(&self, job: Job) {
        self.set_phase(WorkerPhase::Executing);
        info!(command = %job.command, attempts = job.attempts, "executing job");

        let outcome = match self.executor.execute(&job.command, self.job_timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "executor failed, counting as a failed attempt");
                ExecOutcome::not_run(e.to_string())
            }
        };

        self.set_phase(WorkerPhase::Reporting);
        self.report(&job.id, &outcome).await;
    }

    /// Record the outcome. `StoreUnavailable` is retried with capped backoff
    /// until it goes through; any other rejection is logged and dropped.
    async fn report(&self, id: &JobId, outcome: &ExecOutcome) {
        let mut delay = REPORT_RETRY_INITIAL;
        loop {
            let result = if outcome.is_success() {
                self.store
                    .mark_completed(id, &self.id)
                    .await
                    .map(|()| JobState::Completed)
            } else {
                self.store.mark_failed(id, &self.id, outcome).await
            };

            match result {
                Ok(JobState::Completed) => {
                    info!("job completed");
                    return;
                }
                Ok(JobState::Dead) => {
                    warn!(
                        exit_code = outcome.exit_code,
                        timed_out = outcome.timed_out,
                        "job failed, moved to dead letter queue"
                    );
                    return;
                }
                Ok(state) => {
                    warn!(
                        exit_code = outcome.exit_code,
                        timed_out = outcome.timed_out,
                        %state,
                        "job failed, retry scheduled"
                    );
                    return;
                }
                Err(e) if e.is_retryable() => {
                    error!(error = %e, retry_in = ?delay, "report failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(REPORT_RETRY_MAX);
                }
                Err(e) => {
                    // 例: operator が stale lock を解放した後の遅延報告
                    error!(error = %e, "report rejected by store");
                    return;
                }
            }
        }
    }

    /// Wait one poll interval. Returns `true` when shutdown was requested meanwhile.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow_and_update(),
        }
    }

    fn set_phase(&self, phase: WorkerPhase) {
        self.phase_tx.send_replace(phase);
    }
}

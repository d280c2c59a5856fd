//! `queuectl worker start` / `queuectl worker stop`

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Subcommand};
use queuectl_core::app::liveness_cutoff;
use queuectl_core::impls::{ShellExecutor, send_terminate};
use queuectl_core::ports::WorkerRegistry;
use queuectl_core::{WorkerPool, WorkerRecord};
use tracing::{error, info, warn};

use super::Session;
use crate::output;

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Run workers in the foreground until Ctrl-C / SIGTERM
    Start {
        /// Number of concurrent workers (default: `[worker] count`)
        #[arg(long)]
        count: Option<usize>,
    },
    /// Send SIGTERM to every process running registered workers
    Stop,
}

pub async fn execute(args: WorkerArgs, session: &Session) -> anyhow::Result<()> {
    match args.command {
        WorkerCommand::Start { count } => {
            let count = count.unwrap_or(session.app.worker.count);
            anyhow::ensure!(count > 0, "--count must be at least 1");

            let pool = WorkerPool::start_registered(
                count,
                session.store.clone(),
                Arc::new(ShellExecutor::new()),
                session.registry.clone(),
                &session.settings,
            )
            .await?;
            for (id, _) in pool.workers() {
                info!(worker.id = %id, "worker running");
            }

            shutdown_signal().await;
            info!("shutdown requested, waiting for in-flight jobs");
            pool.shutdown_and_join().await;
            Ok(())
        }
        WorkerCommand::Stop => {
            let workers = session
                .registry
                .live_workers(liveness_cutoff(Utc::now()))
                .await?;
            let pids = worker_pids(&workers, std::process::id());
            if pids.is_empty() {
                output::print_success("no active workers");
                return Ok(());
            }

            let mut signalled = 0;
            for pid in pids {
                match send_terminate(pid) {
                    Ok(true) => {
                        info!(pid, "sent SIGTERM");
                        signalled += 1;
                    }
                    Ok(false) => warn!(pid, "worker process already gone"),
                    Err(e) => warn!(pid, error = %e, "failed to signal worker process"),
                }
            }
            output::print_success(&format!("sent SIGTERM to {signalled} worker process(es)"));
            Ok(())
        }
    }
}

/// Distinct pids owning `workers`, excluding `own_pid`.
fn worker_pids(workers: &[WorkerRecord], own_pid: u32) -> BTreeSet<u32> {
    workers
        .iter()
        .map(|w| w.pid)
        .filter(|pid| *pid != own_pid)
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

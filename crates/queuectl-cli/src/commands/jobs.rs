//! `queuectl status` / `queuectl list`

use chrono::Utc;
use clap::Args;
use queuectl_core::app::liveness_cutoff;
use queuectl_core::ports::{JobStore, WorkerRegistry};
use queuectl_core::JobState;

use super::Session;
use crate::output::{self, OutputFormat};

/// Arguments for list
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only jobs in this state (pending, processing, completed, failed, dead)
    #[arg(long, value_parser = parse_state)]
    pub state: Option<JobState>,

    /// Show at most this many jobs (oldest first)
    #[arg(long)]
    pub limit: Option<u32>,
}

fn parse_state(raw: &str) -> Result<JobState, String> {
    raw.parse::<JobState>().map_err(|_| {
        let known: Vec<_> = JobState::ALL.iter().map(|s| s.as_str()).collect();
        format!("expected one of: {}", known.join(", "))
    })
}

pub async fn status(session: &Session, format: OutputFormat) -> anyhow::Result<()> {
    let summary = session.store.summary_by_state().await?;
    let workers = session.registry.live_workers(liveness_cutoff(Utc::now())).await?;
    output::print_status(&summary, workers.len(), format)
}

pub async fn list(args: ListArgs, session: &Session, format: OutputFormat) -> anyhow::Result<()> {
    let jobs = session.store.list_by_state(args.state, args.limit).await?;
    output::print_jobs(&jobs, format)
}

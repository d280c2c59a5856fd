//! `queuectl enqueue`

use clap::Args;
use queuectl_core::ports::{JobStore, SystemClock, UlidGenerator};
use queuectl_core::JobSubmission;
use serde_json::json;

use super::Session;
use crate::output::{self, OutputFormat};

/// Arguments for enqueue
#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Job as JSON: {"id"?, "command", "priority"?, "max_retries"?}
    pub job: String,
}

pub async fn execute(
    args: EnqueueArgs,
    session: &Session,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let ids = UlidGenerator::new(SystemClock);
    let job = JobSubmission::from_json(&args.job)?.into_new_job(&session.settings, &ids)?;
    let id = session.store.enqueue(job).await?;

    match format {
        OutputFormat::Json => output::print_json(&json!({ "id": id })),
        OutputFormat::Text => {
            output::print_success(&format!("enqueued job {id}"));
            Ok(())
        }
    }
}

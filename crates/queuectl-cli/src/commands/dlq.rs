//! `queuectl dlq`

use clap::{Args, Subcommand};
use queuectl_core::{DlqManager, JobId};

use super::Session;
use crate::output::{self, OutputFormat};

/// Arguments for dlq commands
#[derive(Debug, Args)]
pub struct DlqArgs {
    /// DLQ subcommand
    #[command(subcommand)]
    pub command: DlqCommand,
}

/// DLQ subcommands
#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List dead jobs
    List,
    /// Move a dead job back to pending with attempts reset
    Retry {
        /// Job ID
        id: String,
    },
}

pub async fn execute(args: DlqArgs, session: &Session, format: OutputFormat) -> anyhow::Result<()> {
    let dlq = DlqManager::new(session.store.clone());

    match args.command {
        DlqCommand::List => output::print_jobs(&dlq.list().await?, format),
        DlqCommand::Retry { id } => {
            let id = JobId::parse(id)?;
            dlq.retry(&id).await?;
            output::print_success(&format!("job {id} moved back to pending"));
            Ok(())
        }
    }
}

//! `queuectl locks release`

use chrono::{TimeDelta, Utc};
use clap::{Args, Subcommand};
use queuectl_core::ports::JobStore;
use serde_json::json;

use super::Session;
use crate::output::{self, OutputFormat};

/// Arguments for lock commands
#[derive(Debug, Args)]
pub struct LocksArgs {
    /// Lock subcommand
    #[command(subcommand)]
    pub command: LocksCommand,
}

/// Lock subcommands
#[derive(Debug, Subcommand)]
pub enum LocksCommand {
    /// Return processing jobs locked longer than the given age to pending
    Release {
        /// Minimum lock age in seconds
        #[arg(long)]
        older_than: u32,
    },
}

pub async fn execute(
    args: LocksArgs,
    session: &Session,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match args.command {
        LocksCommand::Release { older_than } => {
            let stale_before = Utc::now() - TimeDelta::seconds(i64::from(older_than));
            let released = session.store.release_stale_locks(stale_before).await?;

            match format {
                OutputFormat::Json => output::print_json(&json!({ "released": released })),
                OutputFormat::Text => {
                    output::print_success(&format!("released {released} stale lock(s)"));
                    Ok(())
                }
            }
        }
    }
}

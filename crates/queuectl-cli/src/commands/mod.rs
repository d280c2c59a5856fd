//! CLI command definitions and dispatch.

pub mod config;
pub mod dlq;
pub mod enqueue;
pub mod jobs;
pub mod locks;
pub mod worker;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use queuectl_core::config::AppConfig;
use queuectl_core::ports::{ConfigStore, SystemClock};
use queuectl_core::queue::{SqliteConfigStore, SqliteJobStore, SqliteWorkerRegistry, connect};
use queuectl_core::QueueSettings;

use crate::output::OutputFormat;

/// queuectl: a persistent background job queue for shell commands
#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file (defaults to ./queuectl.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a job: '{"id":"t1","command":"echo hi","priority":"high","max_retries":2}'
    Enqueue(enqueue::EnqueueArgs),
    /// Run workers
    Worker(worker::WorkerArgs),
    /// Show job counts per state and the number of active workers
    Status,
    /// List jobs
    List(jobs::ListArgs),
    /// Inspect and retry dead jobs
    Dlq(dlq::DlqArgs),
    /// Read and write persisted queue settings
    Config(config::ConfigArgs),
    /// Recover jobs held by crashed workers
    Locks(locks::LocksArgs),
}

impl Cli {
    pub async fn execute(self, app: AppConfig) -> anyhow::Result<()> {
        let format = self.format;
        match self.command {
            // config は壊れた設定値を直せるよう、overlay せずに開く
            Commands::Config(args) => config::execute(args, &app, format).await,
            Commands::Enqueue(args) => {
                enqueue::execute(args, &Session::open(app).await?, format).await
            }
            Commands::Worker(args) => worker::execute(args, &Session::open(app).await?).await,
            Commands::Status => jobs::status(&Session::open(app).await?, format).await,
            Commands::List(args) => jobs::list(args, &Session::open(app).await?, format).await,
            Commands::Dlq(args) => dlq::execute(args, &Session::open(app).await?, format).await,
            Commands::Locks(args) => {
                locks::execute(args, &Session::open(app).await?, format).await
            }
        }
    }
}

/// Everything a queue command needs: effective settings, the job store and
/// the worker registry.
pub struct Session {
    pub app: AppConfig,
    pub settings: QueueSettings,
    pub store: Arc<SqliteJobStore>,
    pub registry: Arc<SqliteWorkerRegistry>,
}

impl Session {
    /// Open the database and overlay persisted config records onto `[queue]`.
    pub async fn open(app: AppConfig) -> anyhow::Result<Self> {
        let pool = connect(&app.database)
            .await
            .with_context(|| format!("failed to open {}", app.database.url))?;

        let records = SqliteConfigStore::new(pool.clone()).entries().await?;
        let settings = app
            .queue
            .clone()
            .overlay(&records)
            .context("invalid persisted configuration (fix with `queuectl config set`)")?;

        let registry = SqliteWorkerRegistry::new(pool.clone(), Arc::new(SystemClock));
        let store = SqliteJobStore::new(pool, Arc::new(SystemClock))
            .with_retry_policy(settings.retry_policy());

        Ok(Self {
            app,
            settings,
            store: Arc::new(store),
            registry: Arc::new(registry),
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use queuectl_core::JobState;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_operator_commands() {
        let cli = Cli::try_parse_from(["queuectl", "worker", "start", "--count", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Worker(worker::WorkerArgs {
                command: worker::WorkerCommand::Start { count: Some(3) }
            })
        ));

        let cli = Cli::try_parse_from(["queuectl", "worker", "stop"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Worker(worker::WorkerArgs {
                command: worker::WorkerCommand::Stop
            })
        ));

        let cli = Cli::try_parse_from(["queuectl", "list", "--state", "dead", "-f", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::List(jobs::ListArgs {
                state: Some(JobState::Dead),
                limit: None
            })
        ));

        let cli = Cli::try_parse_from(["queuectl", "list", "--limit", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List(jobs::ListArgs {
                state: None,
                limit: Some(5)
            })
        ));

        let cli = Cli::try_parse_from(["queuectl", "config", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(config::ConfigArgs {
                command: config::ConfigCommand::List
            })
        ));

        let cli = Cli::try_parse_from(["queuectl", "locks", "release", "--older-than", "600"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Locks(locks::LocksArgs {
                command: locks::LocksCommand::Release { older_than: 600 }
            })
        ));
    }

    #[test]
    fn rejects_unknown_state_filter() {
        assert!(Cli::try_parse_from(["queuectl", "list", "--state", "running"]).is_err());
    }

    #[test]
    fn rejects_negative_limit() {
        assert!(Cli::try_parse_from(["queuectl", "list", "--limit", "-1"]).is_err());
    }
}

//! Plain-text and JSON output for CLI commands.

use queuectl_core::{Job, StateSummary};
use serde::Serialize;

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_jobs(jobs: &[Job], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(jobs),
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }
            println!(
                "{:<28} {:<11} {:<7} {:>8}  {:<25} COMMAND",
                "ID", "STATE", "PRIO", "ATTEMPTS", "NEXT RETRY"
            );
            for job in jobs {
                let next_retry = job
                    .next_retry_at
                    .map(|at| at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<28} {:<11} {:<7} {:>8}  {:<25} {}",
                    job.id.as_str(),
                    job.state.as_str(),
                    job.priority.as_str(),
                    format!("{}/{}", job.attempts, job.max_retries),
                    next_retry,
                    job.command
                );
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct StatusView<'a> {
    jobs: &'a StateSummary,
    workers: WorkerCounts,
}

#[derive(Serialize)]
struct WorkerCounts {
    active: usize,
}

pub fn print_status(
    summary: &StateSummary,
    active_workers: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&StatusView {
            jobs: summary,
            workers: WorkerCounts {
                active: active_workers,
            },
        }),
        OutputFormat::Text => {
            for (state, count) in summary.iter() {
                println!("{:<11} {count}", state.as_str());
            }
            println!("{:<11} {}", "total", summary.total());
            println!("{:<11} {active_workers}", "workers");
            Ok(())
        }
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {msg}");
}

//! queuectl CLI entry point.

use anyhow::Context;
use clap::Parser;
use queuectl_core::config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config.logging);

    cli.execute(config).await
}

/// Logs go to stderr; stdout is reserved for command output.
/// `RUST_LOG` が設定されていれば設定ファイルの level より優先する。
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

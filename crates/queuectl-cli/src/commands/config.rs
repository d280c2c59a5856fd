//! `queuectl config`

use anyhow::Context;
use clap::{Args, Subcommand};
use queuectl_core::config::AppConfig;
use queuectl_core::ports::ConfigStore;
use queuectl_core::queue::{SqliteConfigStore, connect};
use queuectl_core::QueueSettings;
use serde::Serialize;

use crate::output::{self, OutputFormat};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Persist a queue setting (max-retries, backoff-base, backoff-initial-delay,
    /// poll-interval-ms, job-timeout)
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
    /// Show effective settings, or one of them
    Get {
        /// Setting key
        key: Option<String>,
    },
    /// Show all effective settings (same as `get` without a key)
    List,
}

#[derive(Debug, Serialize)]
struct SettingRow {
    key: &'static str,
    value: String,
    /// `persisted` when overridden with `config set`, `file` otherwise
    source: &'static str,
}

pub async fn execute(args: ConfigArgs, app: &AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    let pool = connect(&app.database)
        .await
        .with_context(|| format!("failed to open {}", app.database.url))?;
    let store = SqliteConfigStore::new(pool);

    match args.command {
        ConfigCommand::Set { key, value } => {
            // 他のレコードと合わせた結果が有効であることを確認してから保存する
            let mut records = store.entries().await?;
            records.retain(|(k, _)| *k != key);
            records.push((key.clone(), value.clone()));
            app.queue.clone().overlay(&records)?;

            store.set(&key, value.trim()).await?;
            output::print_success(&format!("{key} = {}", value.trim()));
            Ok(())
        }
        ConfigCommand::Get { key } => show(&store, app, key.as_deref(), format).await,
        ConfigCommand::List => show(&store, app, None, format).await,
    }
}

async fn show(
    store: &SqliteConfigStore,
    app: &AppConfig,
    key: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let records = store.entries().await?;
    let mut effective = app.queue.clone();
    for (k, v) in &records {
        effective.apply_record(k, v)?;
    }

    let keys: Vec<&'static str> = match key {
        Some(key) => {
            let known = QueueSettings::KEYS
                .into_iter()
                .find(|k| *k == key)
                .with_context(|| {
                    format!(
                        "unknown key {key:?} (expected one of: {})",
                        QueueSettings::KEYS.join(", ")
                    )
                })?;
            vec![known]
        }
        None => QueueSettings::KEYS.to_vec(),
    };

    let rows: Vec<SettingRow> = keys
        .into_iter()
        .map(|key| SettingRow {
            key,
            value: effective.value_of(key).unwrap_or_default(),
            source: if records.iter().any(|(k, _)| k == key) {
                "persisted"
            } else {
                "file"
            },
        })
        .collect();

    match format {
        OutputFormat::Json => output::print_json(&rows),
        OutputFormat::Text => {
            for row in rows {
                println!("{:<22} {:<8} ({})", row.key, row.value, row.source);
            }
            Ok(())
        }
    }
}

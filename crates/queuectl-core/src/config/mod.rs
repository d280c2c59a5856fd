//! Application configuration schemas.
//!
//! Deserialized via the `config` crate from an optional TOML file and
//! `QUEUECTL__SECTION__KEY` environment variables. Each sub-module is one section.

pub mod logging;
pub mod queue;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::logging::LoggingConfig;
pub use self::queue::QueueSettings;
pub use self::worker::WorkerConfig;

use crate::error::QueueError;

/// Default config file name, looked up in the working directory (`.toml` implied).
pub const DEFAULT_CONFIG_FILE: &str = "queuectl";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://queue.db`. The file is created if missing.
    #[serde(default = "default_url")]
    pub url: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; without one, `queuectl.toml` in the working
    /// directory is used when present. Environment variables override both.
    pub fn load(path: Option<&str>) -> Result<Self, QueueError> {
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("QUEUECTL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.queue.validate()?;
        Ok(app)
    }
}

fn default_url() -> String {
    "sqlite://queue.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_default_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        // Optional lookup: point at a directory without a config file.
        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name(path.to_str().unwrap()).required(false),
            )
            .build()
            .unwrap();
        let app: AppConfig = cfg.try_deserialize().unwrap();
        assert_eq!(app.queue, QueueSettings::default());
        assert_eq!(app.database.url, "sqlite://queue.db");
        assert_eq!(app.worker.count, 1);
    }

    #[test]
    fn explicit_file_is_read() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[queue]\nmax_retries = 5\nbackoff_base = 3\n\n[worker]\ncount = 4\n\n[database]\nurl = \"sqlite://x.db\""
        )
        .unwrap();

        let app = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(app.queue.max_retries, 5);
        assert_eq!(app.queue.backoff_base, 3);
        assert_eq!(app.queue.initial_delay_secs, 1);
        assert_eq!(app.worker.count, 4);
        assert_eq!(app.database.url, "sqlite://x.db");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = AppConfig::load(Some("/definitely/not/here/queuectl")).unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[queue]\nbackoff_base = 1").unwrap();
        assert!(matches!(
            AppConfig::load(file.path().to_str()),
            Err(QueueError::Config(_))
        ));
    }
}

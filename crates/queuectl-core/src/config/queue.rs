//! Queue behaviour settings (retry budget, backoff, polling, timeouts).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::queue::RetryPolicy;

/// Typed settings read by enqueue, the retry policy and the worker loop.
///
/// Loaded from the `[queue]` section, then overlaid with the persisted
/// key-value records (see [`QueueSettings::KEYS`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Default `max_retries` for submissions that omit it.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Multiplier of the exponential backoff. Must be at least 2.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
    /// Backoff unit in seconds. Must be non-zero.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    /// Idle wait between empty claims, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Execution timeout per job, in seconds.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

impl QueueSettings {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Keys accepted by `queuectl config set`.
    pub const KEYS: [&'static str; 5] = [
        "max-retries",
        "backoff-base",
        "backoff-initial-delay",
        "poll-interval-ms",
        "job-timeout",
    ];

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.initial_delay(), self.backoff_base)
    }

    /// Apply one persisted record. Unknown keys and unparsable values are rejected
    /// so a typo in `config set` is reported instead of ignored.
    pub fn apply_record(&mut self, key: &str, value: &str) -> Result<(), QueueError> {
        match key {
            "max-retries" => self.max_retries = parse_value(key, value)?,
            "backoff-base" => self.backoff_base = parse_value(key, value)?,
            "backoff-initial-delay" => self.initial_delay_secs = parse_value(key, value)?,
            "poll-interval-ms" => self.poll_interval_ms = parse_value(key, value)?,
            "job-timeout" => self.job_timeout_secs = parse_value(key, value)?,
            other => {
                return Err(QueueError::Config(format!(
                    "unknown key {other:?} (expected one of: {})",
                    Self::KEYS.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Current value of a `config set` key, rendered the way it is stored.
    pub fn value_of(&self, key: &str) -> Option<String> {
        let value = match key {
            "max-retries" => self.max_retries.to_string(),
            "backoff-base" => self.backoff_base.to_string(),
            "backoff-initial-delay" => self.initial_delay_secs.to_string(),
            "poll-interval-ms" => self.poll_interval_ms.to_string(),
            "job-timeout" => self.job_timeout_secs.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Overlay every record, then validate the result.
    pub fn overlay<'a>(
        mut self,
        records: impl IntoIterator<Item = &'a (String, String)>,
    ) -> Result<Self, QueueError> {
        for (key, value) in records {
            self.apply_record(key, value)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.backoff_base < 2 {
            return Err(QueueError::Config(format!(
                "backoff-base must be at least 2 (got {})",
                self.backoff_base
            )));
        }
        if self.initial_delay_secs == 0 {
            return Err(QueueError::Config(
                "backoff-initial-delay must be at least 1 second".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(QueueError::Config(
                "poll-interval-ms must be at least 1".to_string(),
            ));
        }
        if self.job_timeout_secs == 0 {
            return Err(QueueError::Config(
                "job-timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            initial_delay_secs: default_initial_delay_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, QueueError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| QueueError::Config(format!("invalid value {value:?} for {key}: {e}")))
}

fn default_max_retries() -> u32 {
    QueueSettings::DEFAULT_MAX_RETRIES
}

fn default_backoff_base() -> u32 {
    2
}

fn default_initial_delay_secs() -> u64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_job_timeout_secs() -> u64 {
    300
}

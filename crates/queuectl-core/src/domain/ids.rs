//! Domain identifiers (strongly-typed IDs).
//!
//! Job ID はクライアント指定の任意文字列、もしくは `IdGenerator` が発行する
//! `job-<ULID>` 形式。どちらも作成後は不変。
//!
//! `JobId` と `WorkerId` は別の型なので、claim の引数を取り違えることはできない。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::QueueError;

/// Longest id accepted from a submission.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Identifier of a Job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Validate a client-supplied id.
    ///
    /// Leading/trailing whitespace is not trimmed: `" a"` is rejected rather than
    /// silently becoming `"a"`.
    pub fn parse(value: impl Into<String>) -> Result<Self, QueueError> {
        let value = value.into();
        if value.is_empty() {
            return Err(QueueError::InvalidSpec("id must not be empty".to_string()));
        }
        if value.len() > MAX_JOB_ID_LEN {
            return Err(QueueError::InvalidSpec(format!(
                "id must be at most {MAX_JOB_ID_LEN} bytes (got {})",
                value.len()
            )));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(QueueError::InvalidSpec(format!(
                "id {value:?} must not contain whitespace or control characters"
            )));
        }
        Ok(Self(value))
    }

    /// Wrap a value already known to be valid (generated ids, rows read back from the store).
    pub(crate) fn from_trusted(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a worker loop. Stored in `locked_by` while a job is claimed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// `worker-<pid>-<index>`: unique across pools running in separate processes
    /// against the same database file.
    pub fn for_pool_member(index: usize) -> Self {
        Self(format!("worker-{}-{}", std::process::id(), index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("t1")]
    #[case("job-01HZX3")]
    #[case("nightly.backup_2024-01-01")]
    fn accepts_reasonable_ids(#[case] raw: &str) {
        let id = JobId::parse(raw).unwrap();
        assert_eq!(id.as_str(), raw);
        assert_eq!(id.to_string(), raw);
    }

    #[rstest]
    #[case("")]
    #[case(" t1")]
    #[case("two words")]
    #[case("tab\there")]
    fn rejects_malformed_ids(#[case] raw: &str) {
        let err = JobId::parse(raw).unwrap_err();
        assert!(matches!(err, QueueError::InvalidSpec(_)));
    }

    #[test]
    fn rejects_overlong_id() {
        let raw = "x".repeat(MAX_JOB_ID_LEN + 1);
        assert!(matches!(JobId::parse(raw), Err(QueueError::InvalidSpec(_))));
    }

    #[test]
    fn pool_member_ids_are_distinct() {
        let a = WorkerId::for_pool_member(0);
        let b = WorkerId::for_pool_member(1);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("worker-"));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = JobId::parse("t1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"t1\"");
    }
}

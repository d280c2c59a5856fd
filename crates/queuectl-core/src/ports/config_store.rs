//! ConfigStore port - 永続化された key-value 設定
//!
//! `queuectl config set` で書き込まれ、worker 起動時に `QueueSettings` に重ねる。

use async_trait::async_trait;

use crate::error::QueueError;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, QueueError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), QueueError>;

    /// All records, ordered by key.
    async fn entries(&self) -> Result<Vec<(String, String)>, QueueError>;
}

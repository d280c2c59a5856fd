//! CommandExecutor port - コマンド実行の抽象化

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ExecOutcome;

/// Failure of the executor itself, as opposed to a command exiting non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs one job command.
///
/// Implementations must return by `timeout` (killing the child if needed, and
/// reporting `ExecOutcome::timed_out`) and must not leak the spawned process.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<ExecOutcome, ExecError>;
}

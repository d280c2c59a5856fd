//! queuectl-core
//!
//! Core building blocks for the queuectl background job queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, job, outcome, decision）
//! - **ports**: 抽象化レイヤー（JobStore, WorkerRegistry, CommandExecutor, Clock, IdGenerator, ConfigStore）
//! - **queue**: JobStore 実装（SQLite / InMemory）と RetryPolicy
//! - **app**: アプリケーションロジック（WorkerLoop, WorkerPool, DlqManager）
//! - **impls**: その他の実装（ShellExecutor, send_terminate）
//! - **config**: 設定の読み込み（ファイル + 環境変数 + 永続化された key/value）
//! - **observability**: 状態ごとの件数
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{DlqManager, WorkerLoop, WorkerPhase, WorkerPool};
pub use config::{AppConfig, QueueSettings};
pub use domain::{
    ExecOutcome, Job, JobId, JobState, JobSubmission, NewJob, Priority, WorkerId, WorkerRecord,
};
pub use error::QueueError;
pub use observability::StateSummary;
pub use queue::{
    InMemoryJobStore, RetryPolicy, SqliteConfigStore, SqliteJobStore, SqliteWorkerRegistry,
};

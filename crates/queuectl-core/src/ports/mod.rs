//! Ports - 抽象化レイヤー
//!
//! 外部とのインターフェース（永続化、プロセス実行、時刻、ID 生成、ワーカー登録）を trait として定義し、
//! 実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - JobStore が状態の正本（SQLite / InMemory）
//! - CommandExecutor はタイムアウトを保証する
//! - Clock を差し替えて backoff を決定的にテストする

pub mod clock;
pub mod config_store;
pub mod executor;
pub mod id_generator;
pub mod job_store;
pub mod worker_registry;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::config_store::ConfigStore;
pub use self::executor::{CommandExecutor, ExecError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::worker_registry::WorkerRegistry;

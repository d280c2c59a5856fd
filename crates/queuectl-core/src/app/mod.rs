//! App - アプリケーション層
//!
//! ports を組み合わせてキューの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **WorkerLoop**: claim → execute → report のループ
//! - **WorkerPool**: WorkerLoop 群の起動と graceful shutdown、workers テーブルへの登録
//! - **DlqManager**: dead ジョブの参照と再投入

pub mod dlq;
pub mod pool;
pub mod worker_loop;

pub use self::dlq::DlqManager;
pub use self::pool::{WorkerPool, liveness_cutoff};
pub use self::worker_loop::{WorkerLoop, WorkerPhase};

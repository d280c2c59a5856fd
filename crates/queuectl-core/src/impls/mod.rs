//! Impls - ports の具象実装（ストア以外）
//!
//! - ShellExecutor: `sh -c` でコマンドを実行する CommandExecutor
//! - send_terminate: 登録済みワーカープロセスへの SIGTERM

pub mod process;
pub mod shell;

pub use self::process::send_terminate;
pub use self::shell::ShellExecutor;

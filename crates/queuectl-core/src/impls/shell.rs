//! ShellExecutor - `sh -c <command>` を tokio::process で実行
//!
//! 子プロセスは専用のプロセスグループで起動し、タイムアウト時はグループごと
//! SIGKILL する（サブシェルやパイプラインの孫プロセスも残さない）。

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::ExecOutcome;
use crate::ports::{CommandExecutor, ExecError};

/// Runs job commands through a POSIX shell.
///
/// The timeout covers the whole run, including draining stdout/stderr. On
/// expiry the child's process group is killed and the shell is reaped before
/// returning.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a different shell binary (must accept `-c <command>`).
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<ExecOutcome, ExecError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
            Ok::<_, io::Error>((status?, stdout?, stderr?))
        };
        let finished = tokio::time::timeout(timeout, run).await;

        match finished {
            Ok(result) => {
                let (status, stdout, stderr) = result?;
                // Killed by a signal: no exit code, report a generic failure.
                let exit_code = status.code().unwrap_or(1);
                debug!(exit_code, "command finished");
                Ok(ExecOutcome::exited(exit_code).with_output(
                    String::from_utf8_lossy(&stdout).into_owned(),
                    String::from_utf8_lossy(&stderr).into_owned(),
                ))
            }
            Err(_) => {
                warn!(?timeout, "command timed out, killing its process group");
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "shell already reaped");
                }
                Ok(ExecOutcome::timed_out())
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// SIGKILL every process in the group led by `pid` (the group was created
/// with `process_group(0)`, so its id is the shell's pid).
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

//! 他プロセスへのシグナル送信（`queuectl worker stop` 用）

use std::io;

/// Send SIGTERM to `pid`.
///
/// Returns `Ok(false)` when no such process exists, so a stale worker row is
/// not an error.
#[cfg(unix)]
pub fn send_terminate(pid: u32) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("pid out of range: {pid}"))
    })?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
pub fn send_terminate(_pid: u32) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signalling workers is only supported on unix",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::Command;
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn terminates_a_running_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        assert!(send_terminate(child.id()).unwrap());

        let deadline = Instant::now() + Duration::from_secs(5);
        let status = loop {
            if let Some(status) = child.try_wait().unwrap() {
                break status;
            }
            assert!(Instant::now() < deadline, "sleep survived SIGTERM");
            std::thread::sleep(Duration::from_millis(20));
        };
        assert!(!status.success());
    }

    #[test]
    fn missing_process_is_not_an_error() {
        // pid_max は i32::MAX より十分小さい
        assert!(!send_terminate(i32::MAX as u32).unwrap());
    }
}

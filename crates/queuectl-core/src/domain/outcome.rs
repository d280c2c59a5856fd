//! Outcome model: what one execution of a job's command produced.
//!
//! Not an error type. A non-zero exit is a normal lifecycle event that the
//! retry policy turns into a state transition.

use serde::{Deserialize, Serialize};

/// Conventional exit code reported for a command killed by the execution timeout.
pub const EXIT_TIMED_OUT: i32 = 124;

/// Exit code reported when the executor could not run the command at all
/// (spawn failure, shell missing, ...).
pub const EXIT_NOT_RUN: i32 = 127;

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub timed_out: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl ExecOutcome {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn timed_out() -> Self {
        Self {
            exit_code: EXIT_TIMED_OUT,
            timed_out: true,
            ..Self::default()
        }
    }

    /// The executor itself failed; `reason` is kept in `stderr` for the logs.
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_NOT_RUN,
            stderr: reason.into(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_clean_zero_exit_is_success() {
        assert!(ExecOutcome::exited(0).is_success());
        assert!(!ExecOutcome::exited(1).is_success());
        assert!(!ExecOutcome::timed_out().is_success());
        assert!(!ExecOutcome::not_run("sh: not found").is_success());

        // A timed-out child may still report 0 if it trapped the signal.
        let odd = ExecOutcome {
            exit_code: 0,
            timed_out: true,
            ..ExecOutcome::default()
        };
        assert!(!odd.is_success());
    }
}

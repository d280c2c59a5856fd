//! Retry policy: decides the next state and backoff delay for a finished execution.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{Decision, ExecOutcome, Job, JobState};

/// Upper bound for a single backoff delay (~136 years); reached only when the
/// exponent overflows.
pub const MAX_DELAY: Duration = Duration::from_secs(u32::MAX as u64);

/// Retry policy for failed jobs.
///
/// delay = initial_delay * backoff_base^attempts, where `attempts` already counts
/// the failure being handled.
///
/// Example with initial_delay=1s, backoff_base=2:
/// - 1st failure: 2s
/// - 2nd failure: 4s
/// - 3rd failure: 8s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub backoff_base: u32,
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, backoff_base: u32) -> Self {
        Self {
            initial_delay,
            backoff_base,
        }
    }

    /// Delay before the job becomes claimable again after its `attempts`-th failure.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.backoff_base
            .checked_pow(attempts)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    /// Pure decision for `job` given the outcome of its latest execution.
    ///
    /// - success: `completed`, attempts untouched
    /// - failure with budget left (`attempts + 1 < max_retries`): `pending`, retry scheduled
    /// - otherwise: `dead`
    pub fn decide(&self, job: &Job, outcome: &ExecOutcome, now: DateTime<Utc>) -> Decision {
        if outcome.is_success() {
            return Decision {
                next_state: JobState::Completed,
                next_attempts: job.attempts,
                next_retry_at: None,
            };
        }

        let next_attempts = job.attempts.saturating_add(1);
        if next_attempts < job.max_retries {
            let delay = TimeDelta::from_std(self.delay_for(next_attempts)).unwrap_or(TimeDelta::MAX);
            let next_retry_at = now
                .checked_add_signed(delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            Decision {
                next_state: JobState::Pending,
                next_attempts,
                next_retry_at: Some(next_retry_at),
            }
        } else {
            Decision {
                next_state: JobState::Dead,
                next_attempts,
                next_retry_at: None,
            }
        }
    }
}

impl Default for RetryPolicy {
    /// 1s initial delay, base 2.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, NewJob};
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn job(attempts: u32, max_retries: u32) -> Job {
        let new = NewJob::new(JobId::parse("t1").unwrap(), "exit 1")
            .unwrap()
            .with_max_retries(max_retries);
        let mut job = Job::from_new(new, now());
        job.attempts = attempts;
        job
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    fn exponential_backoff_doubles(#[case] attempts: u32, #[case] secs: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(attempts), Duration::from_secs(secs));
    }

    #[test]
    fn delays_strictly_increase_until_saturation() {
        let policy = RetryPolicy::new(Duration::from_secs(3), 5);
        let mut prev = Duration::ZERO;
        for attempts in 1..10 {
            let d = policy.delay_for(attempts);
            assert!(d > prev);
            prev = d;
        }
    }

    #[test]
    fn huge_exponent_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(200), MAX_DELAY);
    }

    #[test]
    fn success_completes_without_touching_attempts() {
        let d = RetryPolicy::default().decide(&job(1, 3), &ExecOutcome::exited(0), now());
        assert_eq!(d.next_state, JobState::Completed);
        assert_eq!(d.next_attempts, 1);
        assert_eq!(d.next_retry_at, None);
    }

    #[test]
    fn failure_with_budget_schedules_retry() {
        let d = RetryPolicy::default().decide(&job(0, 3), &ExecOutcome::exited(1), now());
        assert_eq!(d.next_state, JobState::Pending);
        assert_eq!(d.next_attempts, 1);
        assert_eq!(d.next_retry_at, Some(now() + TimeDelta::seconds(2)));
        assert!(d.is_retry());
    }

    #[rstest]
    #[case::zero_budget(0, 0)]
    #[case::last_attempt(1, 2)]
    #[case::already_over(5, 3)]
    fn exhausted_budget_goes_dead(#[case] attempts: u32, #[case] max_retries: u32) {
        let d = RetryPolicy::default().decide(&job(attempts, max_retries), &ExecOutcome::timed_out(), now());
        assert_eq!(d.next_state, JobState::Dead);
        assert_eq!(d.next_attempts, attempts + 1);
        assert_eq!(d.next_retry_at, None);
    }

    #[test]
    fn timeouts_and_spawn_errors_count_as_failures() {
        let policy = RetryPolicy::default();
        for outcome in [ExecOutcome::timed_out(), ExecOutcome::not_run("no shell")] {
            let d = policy.decide(&job(0, 3), &outcome, now());
            assert_eq!(d.next_state, JobState::Pending);
            assert_eq!(d.next_attempts, 1);
        }
    }
}

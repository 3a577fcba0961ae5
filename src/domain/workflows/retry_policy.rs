use time::Duration;

use crate::domain::value_objects::timestamps::Timestamp;

/// Retry policy for jobs whose work failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Destroy jobs that run out of attempts instead of keeping them with
    /// `failed_at` set.
    pub destroy_failed_jobs: bool,
}

/// What to do with a job that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempts: u32, run_at: Timestamp },
    Destroy,
    MarkFailed,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

    /// Returns `true` when another attempt is allowed.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next attempt: `attempts^4 + 5` seconds.
    ///
    /// `attempts` is the number of failures recorded before this one.
    pub fn backoff(attempts: u32) -> Duration {
        let attempts = i64::from(attempts);
        let seconds = attempts
            .saturating_mul(attempts)
            .saturating_mul(attempts)
            .saturating_mul(attempts)
            .saturating_add(5);
        Duration::seconds(seconds)
    }

    /// Decide how to handle a failure of a job that has `attempts` failures so far.
    pub fn decide(&self, attempts: u32, now: Timestamp) -> RetryDecision {
        if self.can_retry(attempts) {
            return RetryDecision::Retry {
                attempts: attempts + 1,
                run_at: now + Self::backoff(attempts),
            };
        }

        if self.destroy_failed_jobs {
            RetryDecision::Destroy
        } else {
            RetryDecision::MarkFailed
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            destroy_failed_jobs: true,
        }
    }
}

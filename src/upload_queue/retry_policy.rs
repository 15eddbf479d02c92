//! Retry policy for failed uploads.
//!
//! Pure exponential backoff: no clock, no store. Callers pass `now`.

use crate::config::UploadQueueSettings;

/// Whether an entry may be attempted now, and from when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    pub next_eligible_at: i64,
}

/// Retry policy implementing capped exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay in seconds, doubled for every recorded attempt.
    pub base_delay_secs: u64,
    /// Maximum delay in seconds (cap for exponential growth).
    pub max_delay_secs: u64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &UploadQueueSettings) -> Self {
        Self {
            base_delay_secs: config.retry_delay_base_secs,
            max_delay_secs: config.max_retry_delay_secs,
        }
    }

    /// Delay after `retry_count` recorded attempts:
    /// `base_delay * 2^retry_count`, capped at `max_delay_secs`.
    pub fn backoff_secs(&self, retry_count: u32) -> u64 {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs)
    }

    /// Earliest time an entry with `retry_count` attempts, the last one at
    /// `last_attempt_at`, may be attempted again.
    pub fn next_eligible_at(&self, retry_count: u32, last_attempt_at: i64) -> i64 {
        let delay = i64::try_from(self.backoff_secs(retry_count)).unwrap_or(i64::MAX);
        last_attempt_at.saturating_add(delay)
    }

    /// An entry that was never attempted is always eligible.
    pub fn evaluate(&self, retry_count: u32, last_attempt_at: Option<i64>, now: i64) -> Eligibility {
        match last_attempt_at {
            Some(last_attempt_at) if retry_count > 0 => {
                let next_eligible_at = self.next_eligible_at(retry_count, last_attempt_at);
                Eligibility {
                    eligible: now >= next_eligible_at,
                    next_eligible_at,
                }
            }
            _ => Eligibility {
                eligible: true,
                next_eligible_at: now,
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&UploadQueueSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, cap: u64) -> RetryPolicy {
        RetryPolicy {
            base_delay_secs: base,
            max_delay_secs: cap,
        }
    }

    #[test]
    fn test_default() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.base_delay_secs, 60);
        assert_eq!(policy.max_delay_secs, 3600);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = policy(60, 3600);

        assert_eq!(policy.backoff_secs(0), 60);
        assert_eq!(policy.backoff_secs(1), 120);
        assert_eq!(policy.backoff_secs(2), 240);
        assert_eq!(policy.backoff_secs(3), 480);
        assert_eq!(policy.backoff_secs(4), 960);
    }

    #[test]
    fn test_backoff_capping() {
        let policy = policy(60, 300);

        assert_eq!(policy.backoff_secs(2), 240);
        // 480 -> capped
        assert_eq!(policy.backoff_secs(3), 300);
        assert_eq!(policy.backoff_secs(5), 300);
    }

    #[test]
    fn test_backoff_huge_retry_count_saturates() {
        let policy = policy(60, 3600);

        assert_eq!(policy.backoff_secs(63), 3600);
        assert_eq!(policy.backoff_secs(64), 3600);
        assert_eq!(policy.backoff_secs(u32::MAX), 3600);
    }

    #[test]
    fn test_next_eligible_monotonic_until_cap() {
        let policy = policy(60, 3600);
        let last_attempt = 1_700_000_000;

        let mut previous = policy.next_eligible_at(0, last_attempt);
        let mut capped = false;
        for retry_count in 1..40 {
            let next = policy.next_eligible_at(retry_count, last_attempt);
            if policy.backoff_secs(retry_count) < policy.max_delay_secs {
                assert!(next > previous, "retry {} did not grow", retry_count);
            } else {
                capped = true;
                assert_eq!(next, last_attempt + 3600);
                assert!(next >= previous);
            }
            previous = next;
        }
        assert!(capped);
    }

    #[test]
    fn test_never_attempted_is_eligible() {
        let policy = policy(60, 3600);
        let now = 1_700_000_000;

        let eligibility = policy.evaluate(0, None, now);
        assert!(eligibility.eligible);
        assert_eq!(eligibility.next_eligible_at, now);

        // retry_count 0 with an abandoned attempt is still immediately eligible
        assert!(policy.evaluate(0, Some(now), now).eligible);
    }

    #[test]
    fn test_evaluate_waits_for_backoff() {
        let policy = policy(60, 3600);
        let last_attempt = 1_700_000_000;

        // Two attempts recorded: 60 * 2^2 = 240s
        let eligibility = policy.evaluate(2, Some(last_attempt), last_attempt + 100);
        assert!(!eligibility.eligible);
        assert_eq!(eligibility.next_eligible_at, last_attempt + 240);

        let eligibility = policy.evaluate(2, Some(last_attempt), last_attempt + 240);
        assert!(eligibility.eligible);
    }

    #[test]
    fn test_zero_base_delay() {
        let policy = policy(0, 3600);

        assert_eq!(policy.backoff_secs(0), 0);
        assert_eq!(policy.backoff_secs(5), 0);
        assert!(policy.evaluate(3, Some(100), 100).eligible);
    }
}

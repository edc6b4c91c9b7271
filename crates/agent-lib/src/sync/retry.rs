//! Retry policy for metric delivery

use std::time::Duration;

/// Delay inserted before a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same delay before every retry
    Fixed(Duration),
    /// Doubling delay starting at `initial`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after `failed_attempts` consecutive failures
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                if failed_attempts == 0 {
                    return Duration::ZERO;
                }
                let factor = 2u32.saturating_pow(failed_attempts - 1);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How many times to try a delivery and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::legacy()
    }
}

impl RetryPolicy {
    /// Three attempts, no delay and no jitter between them
    pub const fn legacy() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::None,
        }
    }

    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Exponential backoff between attempts
    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self::new(max_attempts, Backoff::Exponential { initial, max })
    }

    /// Attempts actually made; a policy always allows at least one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before attempt number `attempt` (1-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.backoff.delay(attempt - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::legacy());
        assert_eq!(policy.attempts(), 3);
        for attempt in 1..=3 {
            assert_eq!(policy.delay_before(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Backoff::None).attempts(), 1);
    }

    #[test]
    fn test_fixed_backoff() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(250)));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(250));
        assert_eq!(policy.delay_before(3), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let policy =
            RetryPolicy::exponential(6, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before(3), Duration::from_secs(2));
        assert_eq!(policy.delay_before(4), Duration::from_secs(4));
        assert_eq!(policy.delay_before(5), Duration::from_secs(5));
        assert_eq!(policy.delay_before(6), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_backoff_does_not_overflow() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
        };
        assert_eq!(backoff.delay(200), Duration::from_secs(300));
    }
}

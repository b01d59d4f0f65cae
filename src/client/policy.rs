//! Bounded exponential backoff.
//!
//! [`ReconnectPolicy`] is pure: it holds no counter of its own. The attempt
//! count lives in the connection manager and is passed in.

use std::time::Duration;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay (1 s).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Backoff parameters: `delay = base_delay * 2^attempts`, no upper cap other
/// than `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl ReconnectPolicy {
    /// Creates a policy with custom parameters.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Maximum number of reconnect attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay for the first exponent.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay before the next attempt: `base_delay * 2^attempts`.
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    #[must_use]
    pub fn next_delay(&self, attempts: u32) -> Duration {
        2u32.checked_pow(attempts)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Returns `true` while another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = ReconnectPolicy::default();
        for attempts in 0..policy.max_attempts() {
            let expected = 1000u64 * 2u64.pow(attempts);
            assert_eq!(policy.next_delay(attempts), Duration::from_millis(expected));
        }
    }

    #[test]
    fn retry_stops_at_max() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
        assert!(!policy.should_retry(6));
    }

    #[test]
    fn huge_exponent_saturates() {
        let policy = ReconnectPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.next_delay(64), Duration::MAX);
    }

    #[test]
    fn zero_max_never_retries() {
        let policy = ReconnectPolicy::new(0, Duration::from_millis(10));
        assert!(!policy.should_retry(0));
    }
}

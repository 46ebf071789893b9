//! Reconnect policy: how many attempts, and how long to wait between them.
//!
//! The policy is a pure function of the attempt count. A bounded budget keeps
//! a permanently dead bridge from spinning in a silent retry loop, while the
//! short fixed delay covers the race between process spawn and its listener
//! becoming ready.

use std::time::Duration;

/// Default number of connection attempts per lifecycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// User-facing text delivered once the attempt budget is spent.
pub const EXHAUSTED_MESSAGE: &str =
    "Unable to start the terminal. Restart picolink or file an issue on our github";

/// Retry/backoff decisions for the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Highest attempt number that may still dial.
    pub max_attempts: u32,

    /// Wait before each reattempt. Fixed; there is no exponential growth.
    pub retry_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    /// Returns true if `attempt` is still within budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Message for the terminal failure after the budget is spent.
    pub fn on_exhausted(&self) -> &'static str {
        EXHAUSTED_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.next_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_should_retry_boundary() {
        let policy = ReconnectPolicy::default();
        for attempt in 0..=40 {
            assert_eq!(policy.should_retry(attempt), attempt <= 20, "attempt {attempt}");
        }
    }

    #[test]
    fn test_delay_is_fixed() {
        let policy = ReconnectPolicy::new(5, Duration::from_millis(50));
        assert_eq!(policy.next_delay(), policy.next_delay());
        assert_eq!(policy.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_exhausted_message_is_actionable() {
        let message = ReconnectPolicy::default().on_exhausted();
        assert!(message.contains("Restart"));
        assert!(message.contains("file an issue"));
    }
}

//! Bounded retry strategy for broker connection attempts.

use std::time::Duration;

use serde::Deserialize;

/// Fixed-delay retry policy: wait `delay` between attempts, give up after
/// `max_attempts` attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "RawRetryPolicy")]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

/// Config-file shape, normalized through [`RetryPolicy::new`].
#[derive(Deserialize)]
struct RawRetryPolicy {
    #[serde(rename = "delay_secs", with = "secs", default = "default_delay")]
    delay: Duration,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
}

impl From<RawRetryPolicy> for RetryPolicy {
    fn from(raw: RawRetryPolicy) -> Self {
        Self::new(raw.delay, raw.max_attempts)
    }
}

fn default_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    5
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Wait before the next attempt after `attempts` failed attempts, or
    /// `None` once the budget is spent.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        (attempts < self.max_attempts).then_some(self.delay)
    }

    /// Upper bound on the time a caller may be blocked by this policy.
    pub fn total_budget(&self) -> Duration {
        self.delay * self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(default_delay(), default_max_attempts())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_five_attempts_five_seconds_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn delays_until_budget_spent() {
        let policy = RetryPolicy::default();
        for attempts in 1..5 {
            assert_eq!(policy.next_delay(attempts), Some(Duration::from_secs(5)));
        }
        assert_eq!(policy.next_delay(5), None);
        assert_eq!(policy.next_delay(6), None);
    }

    #[test]
    fn single_attempt_never_waits() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 1);
        assert_eq!(policy.next_delay(1), None);
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(Duration::ZERO, 0).max_attempts, 1);
    }

    #[test]
    fn total_budget() {
        assert_eq!(RetryPolicy::default().total_budget(), Duration::from_secs(25));
    }

    #[test]
    fn deserialize_from_seconds() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"delay_secs": 2, "max_attempts": 3}"#).unwrap();
        assert_eq!(policy, RetryPolicy::new(Duration::from_secs(2), 3));
    }

    #[test]
    fn deserialized_zero_attempts_clamped_to_one() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"delay_secs": 5, "max_attempts": 0}"#).unwrap();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.total_budget(), Duration::from_secs(5));
    }

    #[test]
    fn deserialize_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }
}

//! Backoff schedule for retried tasks.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Factor applied for each further attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before a task that has failed `attempts` times becomes due
    /// again. Strictly increasing in `attempts`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        // exponent capped so the f64 stays finite
        let exponent = attempts.saturating_sub(1).min(32);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn delay_grows_with_each_attempt() {
        let policy = RetryPolicy::default();

        let d1 = policy.delay_for(1);
        let d2 = policy.delay_for(2);
        let d3 = policy.delay_for(3);

        assert!(d2 > d1);
        assert!(d3 > d2);

        assert_eq!(d1, Duration::from_secs(2));
        assert_eq!(d2, Duration::from_secs(4));
        assert_eq!(d3, Duration::from_secs(8));
    }

    #[test]
    fn large_attempt_counts_stay_finite() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(u32::MAX);
        assert!(delay > Duration::ZERO);
    }
}

use rand::Rng;
use std::time::Duration;

use super::dispatcher::AttemptFailure;
use crate::config::settings::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: f64,
    pub unit: Duration,
    pub jitter: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            unit: Duration::from_millis(config.unit_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic part of the wait before retry number `retry` (1-based):
    /// `unit * base^(retry - 1)`, capped at `max_delay`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.unit.as_millis() as f64 * self.backoff_base.powi(exponent);
        let ceiling = self.max_delay.as_millis() as f64;
        Duration::from_millis(millis.min(ceiling) as u64)
    }

    /// Base delay plus uniform jitter, never above `max_delay`.
    pub fn delay(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        (self.base_delay(retry) + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

/// Bookkeeping for one dispatch call.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub cumulative_delay: Duration,
    pub last_failure: Option<AttemptFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::from(&RetryConfig::default())
    }

    #[test]
    fn defaults_allow_three_attempts() {
        assert_eq!(policy().max_attempts(), 3);
    }

    #[test]
    fn base_delay_grows_exponentially() {
        let policy = policy();
        assert_eq!(policy.base_delay(1), Duration::from_millis(250));
        assert_eq!(policy.base_delay(2), Duration::from_millis(500));
        assert_eq!(policy.base_delay(3), Duration::from_millis(1_000));
    }

    #[test]
    fn base_delay_is_non_decreasing_and_capped() {
        let policy = policy();
        let delays: Vec<Duration> = (1..=40).map(|retry| policy.base_delay(retry)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|delay| *delay <= policy.max_delay));
        assert_eq!(*delays.last().unwrap(), policy.max_delay);
    }

    #[test]
    fn huge_retry_numbers_do_not_overflow() {
        assert_eq!(policy().base_delay(u32::MAX), policy().max_delay);
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let policy = policy();
        for retry in 1..=6 {
            for _ in 0..50 {
                let delay = policy.delay(retry);
                assert!(delay >= policy.base_delay(retry));
                assert!(delay <= policy.base_delay(retry) + policy.jitter);
                assert!(delay <= policy.max_delay);
            }
        }
    }

    #[test]
    fn unit_base_keeps_delay_flat() {
        let policy = RetryPolicy {
            backoff_base: 1.0,
            jitter: Duration::ZERO,
            ..policy()
        };
        assert_eq!(policy.delay(1), policy.delay(5));
    }
}

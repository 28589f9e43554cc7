//! Backoff for deliveries whose owner lock is busy.

use lumen_config::JobsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay schedule for contended deliveries.
///
/// A contended delivery is not a failure; it is parked and tried again after
/// [`delay_for_attempt`](Self::delay_for_attempt). Only after
/// `max_attempts` contended tries does the job fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentionPolicy {
    /// Delay before the first retry.
    pub base_delay_ms: u64,

    /// Growth factor per attempt. `1.0` keeps the delay fixed.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay_ms: u64,

    /// Contended attempts before the job is failed. `0` never gives up.
    pub max_attempts: u32,
}

impl Default for ContentionPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(2000), 150)
    }
}

impl From<&JobsConfig> for ContentionPolicy {
    fn from(config: &JobsConfig) -> Self {
        Self {
            base_delay_ms: config.contention_delay_ms,
            multiplier: config.contention_multiplier,
            max_delay_ms: config.contention_max_delay_ms,
            max_attempts: config.max_contention_attempts,
        }
    }
}

impl ContentionPolicy {
    /// Constant delay between attempts.
    #[allow(clippy::cast_possible_truncation)]
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            base_delay_ms: ms,
            multiplier: 1.0,
            max_delay_ms: ms,
            max_attempts,
        }
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the delay cap.
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay before retrying after the given contended attempt (1-based).
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exp = (attempt - 1).min(64) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exp);
        let capped = if delay.is_finite() {
            (delay as u64).min(self.max_delay_ms.max(self.base_delay_ms))
        } else {
            self.max_delay_ms
        };

        Duration::from_millis(capped)
    }

    /// Returns true once `attempt` contended tries have been used up.
    pub fn should_escalate(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = ContentionPolicy::fixed(Duration::from_millis(2000), 10);
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(2000));
    }

    #[test]
    fn test_growing_delay_is_capped() {
        let policy = ContentionPolicy::fixed(Duration::from_millis(100), 0)
            .with_multiplier(2.0)
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_millis(500));
    }

    #[test]
    fn test_escalation() {
        let policy = ContentionPolicy::fixed(Duration::from_millis(10), 3);
        assert!(!policy.should_escalate(2));
        assert!(policy.should_escalate(3));

        let unlimited = ContentionPolicy::fixed(Duration::from_millis(10), 0);
        assert!(!unlimited.should_escalate(u32::MAX));
    }

    #[test]
    fn test_from_config() {
        let config = JobsConfig::default();
        let policy = ContentionPolicy::from(&config);
        assert_eq!(policy.base_delay_ms, 2000);
        assert_eq!(policy.max_attempts, 150);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(2000));
    }
}

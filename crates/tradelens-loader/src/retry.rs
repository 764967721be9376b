//! Exponential backoff with additive jitter.

use std::time::Duration;

use tradelens_models::config::ExecutorConfig;

/// Exponent ceiling so `2^attempt` cannot overflow.
const MAX_EXPONENT: u32 = 20;

/// `delay(attempt) = base * 2^attempt + uniform(0..=max_jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max_jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl Backoff {
    pub fn new(base: Duration, max_jitter: Duration) -> Self {
        Self { base, max_jitter }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_backoff_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let scaled = base_ms.saturating_mul(1u64 << attempt.min(MAX_EXPONENT));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..=jitter_ms)
        };
        Duration::from_millis(scaled.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_without_jitter() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::ZERO);
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(250));
        for _ in 0..50 {
            for attempt in 0..4 {
                let delay = backoff.delay(attempt).as_millis() as u64;
                let floor = 1000 * (1u64 << attempt);
                assert!(delay >= floor, "attempt={attempt} delay={delay}");
                assert!(delay <= floor + 250, "attempt={attempt} delay={delay}");
            }
        }
    }

    #[test]
    fn huge_attempt_saturates() {
        let backoff = Backoff::new(Duration::from_millis(u64::MAX / 2), Duration::ZERO);
        assert_eq!(backoff.delay(64), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn defaults_follow_executor_config() {
        let backoff = Backoff::default();
        assert_eq!(backoff.base, Duration::from_millis(1000));
        assert_eq!(backoff.max_jitter, Duration::from_millis(250));
    }
}

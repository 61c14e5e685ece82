//! Bounded reconnection with exponential back-off.

use std::time::Duration;

use crate::config::ClientConfig;

/// How `ensure_ready` re-establishes a lost session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Connection attempts per `ensure_ready` call, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.reconnect_attempts.max(1),
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
        }
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// delay = min(base_delay * 2^(attempt-1), max_delay)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_attempt() {
        assert_eq!(ReconnectPolicy::default().max_attempts, 1);
        assert_eq!(ReconnectPolicy::new(0).max_attempts, 1);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = ReconnectPolicy::new(5);
        assert_eq!(policy.calculate_backoff(0), Duration::ZERO);
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(500));
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.calculate_backoff(5), Duration::from_millis(8000));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = ReconnectPolicy::new(100);
        assert_eq!(policy.calculate_backoff(10), Duration::from_secs(30));
        assert_eq!(policy.calculate_backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig {
            reconnect_attempts: 3,
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 250,
            ..Default::default()
        };
        let policy = ReconnectPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.calculate_backoff(3), Duration::from_millis(250));
    }
}

//! Exponential backoff with jitter between inner retries.

use std::time::Duration;

use rand::Rng;

use crate::config::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    jitter_ms: u64,
}

impl Backoff {
    #[must_use]
    pub const fn new(base_ms: u64, max_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_ms,
        }
    }

    #[must_use]
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.base_delay_ms, config.max_delay_ms, config.jitter_ms)
    }

    /// `min(base * 2^attempt + jitter, max)`
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(exponential.saturating_add(jitter).min(self.max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_without_jitter() {
        let backoff = Backoff::new(100, 10_000, 0);
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn caps_at_max_even_for_huge_attempts() {
        let backoff = Backoff::new(1_000, 30_000, 250);
        assert_eq!(backoff.delay(64), Duration::from_millis(30_000));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = Backoff::new(100, 10_000, 50);
        for _ in 0..200 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn zeroed_config_never_sleeps() {
        let config = SyncConfig {
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
            ..SyncConfig::default()
        };
        assert_eq!(Backoff::from_config(&config).delay(4), Duration::ZERO);
    }
}

//! Exponential backoff for the reconnect loop (§4.4).

use rand::Rng;
use std::time::Duration;

/// Doubling backoff starting at 1s, capped by `max_seconds`, with jitter to
/// avoid a thundering herd of reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter_percent: u32,
}

impl Backoff {
    /// `base=1s`, doubling each attempt, capped at `reconnect_backoff_max` seconds.
    #[must_use]
    pub fn new(max_seconds: u64) -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(max_seconds),
            jitter_percent: 20,
        }
    }

    /// Delay before the `attempt`th retry (1-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let scaled = self
            .base
            .as_millis()
            .saturating_mul(1u128 << exponent.min(20));
        let capped = scaled.min(self.max.as_millis()).max(u128::from(u64::MIN));
        let capped_ms = u64::try_from(capped).unwrap_or(u64::MAX);
        Duration::from_millis(Self::jitter(capped_ms, self.jitter_percent, self.max))
    }

    fn jitter(delay_ms: u64, jitter_percent: u32, max: Duration) -> u64 {
        if jitter_percent == 0 {
            return delay_ms;
        }
        let range = delay_ms.saturating_mul(u64::from(jitter_percent)) / 100;
        if range == 0 {
            return delay_ms;
        }
        let offset = rand::thread_rng().gen_range(0..=range.saturating_mul(2));
        let jittered = delay_ms
            .saturating_add(offset)
            .saturating_sub(range);
        jittered.max(100).min(max.as_millis().try_into().unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_each_attempt_until_capped() {
        let backoff = Backoff {
            jitter_percent: 0,
            ..Backoff::new(60)
        };
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(10), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = Backoff::new(60);
        for attempt in 1..8 {
            let d = backoff.delay(attempt);
            assert!(d.as_millis() >= 100);
            assert!(d <= Duration::from_secs(60));
        }
    }
}

//! Backoff policy: decides capped exponential delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capped exponential backoff.
///
/// `delay(n) = min(base * multiplier^n, ceiling)`
///
/// Shared by the poller (exponent = polls already waited) and the retention
/// loop (exponent = consecutive failures).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay for exponent 0.
    #[serde(with = "crate::config::secs")]
    pub base: Duration,

    /// Growth factor per step. Values below 1.0 are treated as 1.0.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    #[serde(with = "crate::config::secs")]
    pub ceiling: Duration,
}

impl Backoff {
    pub fn new(base: Duration, multiplier: f64, ceiling: Duration) -> Self {
        Self {
            base,
            multiplier,
            ceiling,
        }
    }

    /// Calculate the delay for the given exponent.
    ///
    /// Example with base=10s, multiplier=1.5, ceiling=120s:
    /// - 0: 10s
    /// - 1: 15s
    /// - 2: 22.5s
    /// - 6: 113.9s
    /// - 7: 120s (capped)
    pub fn delay(&self, exponent: u32) -> Duration {
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let ceiling_secs = self.ceiling.as_secs_f64();
        // powi overflows to inf long before i32::MAX; clamp keeps from_secs_f64 in range
        let exponent = exponent.min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * multiplier.powi(exponent);
        if !secs.is_finite() || secs >= ceiling_secs {
            return self.ceiling;
        }
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn poll_curve() -> Backoff {
        Backoff::new(Duration::from_secs(10), 1.5, Duration::from_secs(120))
    }

    #[rstest]
    #[case(0, Duration::from_secs(10))]
    #[case(1, Duration::from_secs(15))]
    #[case(2, Duration::from_millis(22_500))]
    #[case(7, Duration::from_secs(120))]
    #[case(500, Duration::from_secs(120))]
    fn poll_curve_grows_then_caps(#[case] exponent: u32, #[case] expected: Duration) {
        assert_eq!(poll_curve().delay(exponent), expected);
    }

    #[test]
    fn doubling_curve_hits_ceiling() {
        let b = Backoff::new(
            Duration::from_secs(3600),
            2.0,
            Duration::from_secs(4 * 3600),
        );
        assert_eq!(b.delay(0), Duration::from_secs(3600));
        assert_eq!(b.delay(1), Duration::from_secs(7200));
        assert_eq!(b.delay(2), Duration::from_secs(4 * 3600));
        assert_eq!(b.delay(3), Duration::from_secs(4 * 3600));
        assert_eq!(b.delay(u32::MAX), Duration::from_secs(4 * 3600));
    }

    #[test]
    fn shrinking_multiplier_is_clamped() {
        let b = Backoff::new(Duration::from_secs(5), 0.1, Duration::from_secs(60));
        assert_eq!(b.delay(4), Duration::from_secs(5));
    }
}

//! The default `BackoffPolicy`: constant/linear/exponential delay strategies
//! with optional full/equal/decorrelated jitter, used for idle polling and
//! job retry scheduling.

use std::time::Duration;

use rand::Rng;
use upload_core::ports::BackoffPolicy;

use crate::model::{BackoffSettings, BackoffStrategy, JitterStrategy};

/// Computes a delay from a [`BackoffStrategy`], randomizes it per the
/// configured [`JitterStrategy`], then floors and clamps the result to
/// `[min_ms, max_ms]`. `attempt` is 1-based: the delay before the first
/// retry uses `attempt == 1`. `attempt == 0` always yields no delay.
#[derive(Debug, Clone, Copy)]
pub struct StaticBackoffPolicy {
    settings: BackoffSettings,
}

impl StaticBackoffPolicy {
    /// Build a policy from its settings.
    #[must_use]
    pub const fn new(settings: BackoffSettings) -> Self {
        Self { settings }
    }

    /// Raw delay in milliseconds before jitter, sanitized to `min_ms` if the
    /// strategy produced `NaN` or infinity (an overflowing exponential, for
    /// instance).
    fn raw_delay_ms(&self, attempt: u32) -> f64 {
        let base = self.settings.base_ms as f64;
        let steps = f64::from(attempt - 1);
        let raw = match self.settings.strategy {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear { increment_ms } => base + (increment_ms as f64) * steps,
            BackoffStrategy::Exponential { factor } => base * factor.powf(steps),
        };
        if raw.is_finite() {
            raw
        } else {
            self.settings.min_ms as f64
        }
    }

    fn jittered_delay_ms(&self, raw_ms: f64) -> f64 {
        let min_ms = self.settings.min_ms as f64;
        let jittered = match self.settings.jitter {
            JitterStrategy::None => raw_ms,
            JitterStrategy::Full => rand::rng().random_range(0.0..=raw_ms.max(0.0)),
            JitterStrategy::Equal => {
                let half = raw_ms / 2.0;
                rand::rng().random_range(half.min(raw_ms)..=half.max(raw_ms))
            }
            JitterStrategy::Decorrelated => {
                let upper = (raw_ms * 3.0).max(min_ms);
                rand::rng().random_range(min_ms..=upper)
            }
        };
        if jittered.is_finite() { jittered } else { min_ms }
    }
}

impl From<BackoffSettings> for StaticBackoffPolicy {
    fn from(settings: BackoffSettings) -> Self {
        Self::new(settings)
    }
}

impl BackoffPolicy for StaticBackoffPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let raw_ms = self.raw_delay_ms(attempt);
        let jittered_ms = self.jittered_delay_ms(raw_ms);
        let min_ms = self.settings.min_ms as f64;
        let max_ms = (self.settings.max_ms as f64).max(min_ms);
        let clamped_ms = jittered_ms.clamp(min_ms, max_ms).floor().max(0.0);
        Duration::from_millis(clamped_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(settings: BackoffSettings) -> StaticBackoffPolicy {
        StaticBackoffPolicy::new(settings)
    }

    #[test]
    fn first_attempt_uses_the_base_delay() {
        let backoff = policy(BackoffSettings::exponential(250, 30_000));
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
    }

    #[test]
    fn exponential_delay_doubles_each_attempt_until_capped() {
        let backoff = policy(BackoffSettings::exponential(100, 5_000));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(7), Duration::from_millis(5_000));
    }

    #[test]
    fn a_very_large_attempt_count_sanitizes_to_the_minimum_instead_of_overflowing() {
        let backoff = policy(BackoffSettings::exponential(100, 60_000));
        assert_eq!(backoff.delay(u32::MAX), Duration::ZERO);
    }

    #[test]
    fn attempt_zero_has_no_delay() {
        let backoff = policy(BackoffSettings::exponential(100, 60_000));
        assert_eq!(backoff.delay(0), Duration::ZERO);
    }

    #[test]
    fn constant_strategy_ignores_the_attempt_number() {
        let settings = BackoffSettings {
            base_ms: 500,
            min_ms: 0,
            max_ms: 10_000,
            strategy: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        };
        let backoff = policy(settings);
        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(9), Duration::from_millis(500));
    }

    #[test]
    fn linear_strategy_grows_by_a_fixed_increment() {
        let settings = BackoffSettings {
            base_ms: 100,
            min_ms: 0,
            max_ms: 10_000,
            strategy: BackoffStrategy::Linear { increment_ms: 50 },
            jitter: JitterStrategy::None,
        };
        let backoff = policy(settings);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(150));
        assert_eq!(backoff.delay(5), Duration::from_millis(300));
    }

    #[test]
    fn full_jitter_never_exceeds_the_raw_delay_or_the_configured_max() {
        let settings = BackoffSettings {
            base_ms: 1_000,
            min_ms: 0,
            max_ms: 2_000,
            strategy: BackoffStrategy::Constant,
            jitter: JitterStrategy::Full,
        };
        let backoff = policy(settings);
        for _ in 0..50 {
            let delay = backoff.delay(1);
            assert!(delay <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn equal_jitter_stays_within_half_to_full_of_the_raw_delay() {
        let settings = BackoffSettings {
            base_ms: 1_000,
            min_ms: 0,
            max_ms: 2_000,
            strategy: BackoffStrategy::Constant,
            jitter: JitterStrategy::Equal,
        };
        let backoff = policy(settings);
        for _ in 0..50 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn decorrelated_jitter_stays_within_min_and_three_times_the_raw_delay() {
        let settings = BackoffSettings {
            base_ms: 100,
            min_ms: 50,
            max_ms: 10_000,
            strategy: BackoffStrategy::Constant,
            jitter: JitterStrategy::Decorrelated,
        };
        let backoff = policy(settings);
        for _ in 0..50 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn an_overflowing_exponential_sanitizes_to_the_minimum_instead_of_panicking() {
        let settings = BackoffSettings {
            base_ms: 1_000,
            min_ms: 10,
            max_ms: 60_000,
            strategy: BackoffStrategy::Exponential { factor: 2.0 },
            jitter: JitterStrategy::None,
        };
        let backoff = policy(settings);
        assert_eq!(backoff.delay(10_000), Duration::from_millis(10));
    }
}

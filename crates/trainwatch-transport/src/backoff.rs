//! Reconnect backoff: `min(max, base * factor^attempt) + uniform(0, jitter)`.

use std::time::Duration;

use rand::Rng;
use trainwatch_core::config::BackoffConfig;

/// Deterministic part of the delay for `attempt`, in milliseconds.
///
/// Non-decreasing in `attempt` and never above `config.max_ms`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn base_delay_ms(config: &BackoffConfig, attempt: u32) -> u64 {
    let exponent = i32::try_from(attempt.min(256)).unwrap_or(256);
    let raw = config.base_ms as f64 * config.factor.powi(exponent);
    let max = config.max_ms as f64;
    if raw.is_finite() && raw < max {
        raw.round() as u64
    } else {
        config.max_ms
    }
}

/// Full delay before the next connect attempt, jitter included.
pub fn reconnect_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let jitter = if config.jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=config.jitter_ms)
    };
    Duration::from_millis(base_delay_ms(config, attempt).saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_documented_curve() {
        let config = BackoffConfig::default();
        assert_eq!(base_delay_ms(&config, 0), 1_000);
        assert_eq!(base_delay_ms(&config, 1), 1_600);
        assert_eq!(base_delay_ms(&config, 2), 2_560);
        assert_eq!(base_delay_ms(&config, 3), 4_096);
    }

    #[test]
    fn non_decreasing_and_capped() {
        let config = BackoffConfig::default();
        let mut prev = 0;
        for attempt in 0..100 {
            let delay = base_delay_ms(&config, attempt);
            assert!(delay >= prev);
            assert!(delay <= 30_000);
            prev = delay;
        }
        assert_eq!(base_delay_ms(&config, 8), 30_000);
        assert_eq!(base_delay_ms(&config, u32::MAX), 30_000);
    }

    #[test]
    fn jitter_stays_in_range() {
        let config = BackoffConfig::default();
        for attempt in [0, 5, 50] {
            for _ in 0..50 {
                let delay = reconnect_delay(&config, attempt);
                let base = Duration::from_millis(base_delay_ms(&config, attempt));
                assert!(delay >= base);
                assert!(delay <= base + Duration::from_millis(300));
            }
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let config = BackoffConfig {
            jitter_ms: 0,
            ..BackoffConfig::default()
        };
        assert_eq!(reconnect_delay(&config, 1), Duration::from_millis(1_600));
    }
}

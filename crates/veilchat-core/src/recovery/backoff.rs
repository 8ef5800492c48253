//! Retry delay computation: bounded exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use veilchat_types::recovery::RecoveryConfig;

/// Upper bound (exclusive) of the additive jitter, in milliseconds.
///
/// Jitter spreads simultaneous retries from many clients so a gateway
/// restart does not produce a synchronized retry storm.
pub const JITTER_MAX_MS: u64 = 1000;

/// Deterministic part of the delay before retry number `attempt`.
///
/// `attempt` is the 0-based backoff exponent: the delay scheduled after
/// the first failure uses `attempt = 0`.
pub fn delay_for_attempt(config: &RecoveryConfig, attempt: u32) -> Duration {
    let factor = config.backoff_multiplier.max(1.0).powi(attempt.min(64) as i32);
    let ms = (config.base_delay_ms as f64 * factor).min(config.max_delay_ms as f64);
    Duration::from_millis(ms as u64)
}

/// Full delay: deterministic backoff plus uniform jitter in
/// `[0, JITTER_MAX_MS)`.
pub fn delay_with_jitter(config: &RecoveryConfig, attempt: u32) -> Duration {
    delay_for_attempt(config, attempt) + jitter()
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RecoveryConfig {
        RecoveryConfig {
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_exponential_growth() {
        let config = config();
        assert_eq!(delay_for_attempt(&config, 0), Duration::from_millis(1000));
        assert_eq!(delay_for_attempt(&config, 1), Duration::from_millis(2000));
        assert_eq!(delay_for_attempt(&config, 2), Duration::from_millis(4000));
        assert_eq!(delay_for_attempt(&config, 3), Duration::from_millis(8000));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = config();
        assert_eq!(delay_for_attempt(&config, 10), Duration::from_millis(30_000));
        // Huge exponents must not overflow.
        assert_eq!(delay_for_attempt(&config, u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_multiplier_below_one_is_clamped() {
        let config = RecoveryConfig {
            backoff_multiplier: 0.5,
            ..config()
        };
        // A shrinking backoff would defeat the point; clamp to constant.
        assert_eq!(delay_for_attempt(&config, 5), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let config = config();
        for _ in 0..100 {
            let delay = delay_with_jitter(&config, 0);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(1000 + JITTER_MAX_MS));
        }
    }
}

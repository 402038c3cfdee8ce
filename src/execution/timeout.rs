//! Per-call timeout resolution.

use std::time::Duration;

use crate::config::EnvSettings;

/// Fallback when neither the call nor the environment sets a timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Upper bound applied to every resolved timeout.
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// First defined value wins: explicit override, environment, fallback.
/// Zero is treated as unset.
pub fn resolve_timeout_ms(explicit: Option<u64>, env: &EnvSettings) -> u64 {
    explicit
        .filter(|ms| *ms > 0)
        .or(env.timeout_ms)
        .unwrap_or(DEFAULT_TIMEOUT_MS)
        .min(MAX_TIMEOUT_MS)
}

pub fn resolve_timeout(explicit: Option<u64>, env: &EnvSettings) -> Duration {
    Duration::from_millis(resolve_timeout_ms(explicit, env))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(timeout_ms: Option<u64>) -> EnvSettings {
        EnvSettings {
            timeout_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(resolve_timeout_ms(Some(100), &env(Some(5_000))), 100);
        assert_eq!(resolve_timeout_ms(None, &env(Some(5_000))), 5_000);
        assert_eq!(resolve_timeout_ms(None, &env(None)), DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_zero_is_unset() {
        assert_eq!(resolve_timeout_ms(Some(0), &env(Some(7))), 7);
    }

    #[test]
    fn test_clamped_to_max() {
        assert_eq!(resolve_timeout_ms(Some(10_000_000), &env(None)), MAX_TIMEOUT_MS);
        assert_eq!(
            resolve_timeout(None, &env(Some(u64::MAX))),
            Duration::from_millis(MAX_TIMEOUT_MS)
        );
    }
}

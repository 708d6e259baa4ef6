//! Environment overrides for tuning knobs
//!
//! Every knob has a compile-time default; a `CAUSAL_*` variable that parses
//! replaces it, anything else keeps the default.
//!
//! ```ignore
//! use causal_core::env::{env_override, env_millis};
//!
//! let capacity: usize = env_override("CAUSAL_CANDIDATE_CAPACITY", 1000);
//! let min_exp = env_millis("CAUSAL_MIN_EXP_MS", 5000);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or malformed.
#[inline]
pub fn env_override<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean knob: "1", "true", "yes", "on" (any case) enable, any other
/// value disables, unset keeps `default`.
#[inline]
pub fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Millisecond knob as a `Duration`.
#[inline]
pub fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_override(key, default_ms))
}

/// Microsecond knob as a `Duration`.
#[inline]
pub fn env_micros(key: &str, default_us: u64) -> Duration {
    Duration::from_micros(env_override(key, default_us))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_keeps_default() {
        let val: usize = env_override("__CAUSAL_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_flag("__CAUSAL_TEST_UNSET__", true));
        assert_eq!(
            env_millis("__CAUSAL_TEST_UNSET__", 7),
            Duration::from_millis(7)
        );
    }

    #[test]
    fn test_parsed_override() {
        std::env::set_var("__CAUSAL_TEST_US__", " 250 ");
        assert_eq!(
            env_micros("__CAUSAL_TEST_US__", 1000),
            Duration::from_micros(250)
        );
        std::env::remove_var("__CAUSAL_TEST_US__");
    }

    #[test]
    fn test_malformed_keeps_default() {
        std::env::set_var("__CAUSAL_TEST_BAD__", "lots");
        let val: u64 = env_override("__CAUSAL_TEST_BAD__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__CAUSAL_TEST_BAD__");
    }

    #[test]
    fn test_flag_variants() {
        for (raw, expected) in [("1", true), ("ON", true), ("yes", true), ("0", false), ("nope", false)] {
            std::env::set_var("__CAUSAL_TEST_FLAG__", raw);
            assert_eq!(env_flag("__CAUSAL_TEST_FLAG__", !expected), expected, "{}", raw);
        }
        std::env::remove_var("__CAUSAL_TEST_FLAG__");
    }
}

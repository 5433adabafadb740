//! Environment overrides for holdout-bench settings.
//!
//! Every key is read with the `HOLDOUT_` prefix, so `env_bool_or("ALLOW_HEURISTICS", false)`
//! consults `HOLDOUT_ALLOW_HEURISTICS`. Unset or unparseable values fall back to
//! the supplied default.
//!
//! ```
//! use holdout_types::env_utils::{env_var_or, env_list};
//!
//! let timeout: u64 = env_var_or("VERIFICATION_TIMEOUT_SECS", 300);
//! let slices: Vec<String> = env_list("ENABLED_SLICES");
//! ```

use std::str::FromStr;

pub const ENV_PREFIX: &str = "HOLDOUT_";

/// Full variable name for a setting.
pub fn env_key(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

fn raw(name: &str) -> Option<String> {
    std::env::var(env_key(name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_var<T: FromStr>(name: &str) -> Option<T> {
    raw(name).and_then(|v| v.parse().ok())
}

pub fn env_var_or<T: FromStr>(name: &str, default: T) -> T {
    env_var(name).unwrap_or(default)
}

fn truthy(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Boolean setting; anything that is neither truthy nor falsy keeps the default.
pub fn env_bool_or(name: &str, default: bool) -> bool {
    raw(name).and_then(|v| truthy(&v)).unwrap_or(default)
}

/// Comma-separated list with blanks dropped. Empty when unset.
pub fn env_list(name: &str) -> Vec<String> {
    raw(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_lookup() {
        std::env::set_var("HOLDOUT_TEST_ENV_SEED", "42");
        assert_eq!(env_var::<u64>("TEST_ENV_SEED"), Some(42));
        assert_eq!(env_var_or::<u64>("TEST_ENV_MISSING_1", 7), 7);
        std::env::set_var("HOLDOUT_TEST_ENV_BAD", "forty");
        assert_eq!(env_var_or::<u64>("TEST_ENV_BAD", 7), 7);
        std::env::remove_var("HOLDOUT_TEST_ENV_SEED");
        std::env::remove_var("HOLDOUT_TEST_ENV_BAD");
    }

    #[test]
    fn test_bool_keeps_default_on_garbage() {
        std::env::set_var("HOLDOUT_TEST_ENV_FLAG_OFF", "off");
        std::env::set_var("HOLDOUT_TEST_ENV_FLAG_ODD", "maybe");
        assert!(!env_bool_or("TEST_ENV_FLAG_OFF", true));
        assert!(env_bool_or("TEST_ENV_FLAG_ODD", true));
        assert!(env_bool_or("TEST_ENV_MISSING_2", true));
        std::env::remove_var("HOLDOUT_TEST_ENV_FLAG_OFF");
        std::env::remove_var("HOLDOUT_TEST_ENV_FLAG_ODD");
    }

    #[test]
    fn test_list_drops_blanks() {
        std::env::set_var("HOLDOUT_TEST_ENV_LIST", "verified, ,mutated,");
        assert_eq!(env_list("TEST_ENV_LIST"), vec!["verified", "mutated"]);
        assert!(env_list("TEST_ENV_MISSING_3").is_empty());
        std::env::remove_var("HOLDOUT_TEST_ENV_LIST");
    }
}

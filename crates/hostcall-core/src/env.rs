//! Environment variable helpers for configuration.
//!
//! ```ignore
//! use hostcall_core::env::{env_get, env_get_opt};
//!
//! let capacity: usize = env_get("HOSTCALL_QUEUE_CAPACITY", 1024);
//! let timeout_ms: Option<u64> = env_get_opt("HOSTCALL_ASYNC_TIMEOUT_MS");
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// `Some(T)` when `key` is set and parses.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// "1", "true", "yes", "on" (any case) are true; any other set value is false.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_defaults() {
        let n: usize = env_get("__HOSTCALL_TEST_UNSET__", 42);
        assert_eq!(n, 42);
        assert!(env_get_bool("__HOSTCALL_TEST_UNSET__", true));
        assert_eq!(env_get_opt::<u64>("__HOSTCALL_TEST_UNSET__"), None);
        assert_eq!(env_get_str("__HOSTCALL_TEST_UNSET__", "repl"), "repl");
        assert!(!env_is_set("__HOSTCALL_TEST_UNSET__"));
    }

    #[test]
    fn test_set_values() {
        std::env::set_var("__HOSTCALL_TEST_NUM__", " 250 ");
        let n: u64 = env_get("__HOSTCALL_TEST_NUM__", 0);
        assert_eq!(n, 250);
        std::env::set_var("__HOSTCALL_TEST_NUM__", "many");
        let n: u64 = env_get("__HOSTCALL_TEST_NUM__", 7);
        assert_eq!(n, 7);
        std::env::remove_var("__HOSTCALL_TEST_NUM__");
    }

    #[test]
    fn test_bool_variants() {
        for (val, expected) in [("1", true), ("YES", true), ("on", true), ("0", false), ("nah", false)] {
            std::env::set_var("__HOSTCALL_TEST_BOOL__", val);
            assert_eq!(env_get_bool("__HOSTCALL_TEST_BOOL__", !expected), expected, "{}", val);
        }
        std::env::remove_var("__HOSTCALL_TEST_BOOL__");
    }
}

//! Runtime configuration

use std::time::Duration;

use hostcall_core::env::{env_get_opt, env_get_str};
use hostcall_core::kprint::LogLevel;

/// Source label the interpreter uses for interactive input.
pub const DEFAULT_INTERACTIVE_SOURCE: &str = "repl";

/// Configuration for the process runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Uncaught errors from this source are reported, not fatal
    pub interactive_source: String,

    /// Age after which `Runtime::reap` fails a pending async call.
    /// `None` keeps calls pending until the host answers.
    pub async_timeout: Option<Duration>,

    /// Log level override (default: leave kprint's own setting)
    pub log_level: Option<LogLevel>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interactive_source: DEFAULT_INTERACTIVE_SOURCE.to_string(),
            async_timeout: None,
            log_level: None,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `HOSTCALL_INTERACTIVE_SOURCE`,
    /// `HOSTCALL_ASYNC_TIMEOUT_MS` and `HOSTCALL_LOG_LEVEL`.
    pub fn from_env() -> Self {
        let config = Self::default()
            .interactive_source(env_get_str("HOSTCALL_INTERACTIVE_SOURCE", DEFAULT_INTERACTIVE_SOURCE));
        let config = match env_get_opt::<u64>("HOSTCALL_ASYNC_TIMEOUT_MS") {
            Some(ms) => config.async_timeout(Duration::from_millis(ms)),
            None => config,
        };
        match std::env::var("HOSTCALL_LOG_LEVEL").ok().and_then(|v| LogLevel::parse(&v)) {
            Some(level) => config.log_level(level),
            None => config,
        }
    }

    pub fn interactive_source(mut self, source: impl Into<String>) -> Self {
        self.interactive_source = source.into();
        self
    }

    pub fn async_timeout(mut self, d: Duration) -> Self {
        self.async_timeout = Some(d);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.interactive_source.is_empty() {
            return Err("interactive_source must not be empty");
        }
        if self.async_timeout == Some(Duration::ZERO) {
            return Err("async_timeout must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let c = RuntimeConfig::new();
        assert_eq!(c.interactive_source, "repl");
        assert_eq!(c.async_timeout, None);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RuntimeConfig::new().interactive_source("").validate().is_err());
        assert!(RuntimeConfig::new().async_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("HOSTCALL_INTERACTIVE_SOURCE", "deno repl");
        std::env::set_var("HOSTCALL_ASYNC_TIMEOUT_MS", "1500");
        let c = RuntimeConfig::from_env();
        std::env::remove_var("HOSTCALL_INTERACTIVE_SOURCE");
        std::env::remove_var("HOSTCALL_ASYNC_TIMEOUT_MS");

        assert_eq!(c.interactive_source, "deno repl");
        assert_eq!(c.async_timeout, Some(Duration::from_millis(1500)));
    }
}

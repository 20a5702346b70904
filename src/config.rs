//! Configuration for the bridge.
//!
//! All settings are named key/value pairs read from an ambient source,
//! normally the process environment (optionally overridden by CLI flags).
//! An empty value is treated the same as an unset one.
//!
//! Numeric pool policies are best-effort overrides: a value that does not
//! parse keeps the default without error or log output.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::command::{CommandError, CommandTemplate};

pub const SOURCE_PLUGIN_PATH: &str = "SOURCE_PLUGIN_PATH";
pub const SOURCE_PLUGIN_SYMBOL: &str = "SOURCE_PLUGIN_SYMBOL";
pub const SINK_PLUGIN_PATH: &str = "SINK_PLUGIN_PATH";
pub const SINK_PLUGIN_SYMBOL: &str = "SINK_PLUGIN_SYMBOL";
pub const FUNCTION_COMMAND: &str = "FUNCTION_COMMAND";
pub const MAX_FUNCTION_COUNT: &str = "MAX_FUNCTION_COUNT";
pub const MAX_WAIT_MILLIS: &str = "MAX_WAIT_MILLIS";
pub const MAX_EXEC_MILLIS: &str = "MAX_EXEC_MILLIS";

pub const DEFAULT_MAX_CONCURRENT_INVOKERS: usize = 8;
pub const DEFAULT_MAX_WAIT_MILLIS: u64 = 500;
pub const DEFAULT_MAX_EXEC_MILLIS: u64 = 30_000;

/// Ambient key/value configuration
pub trait ConfigSource: Send + Sync {
    /// Raw value for `key`, if set
    fn get(&self, key: &str) -> Option<String>;

    /// Full environment handed down to function processes
    fn vars(&self) -> Vec<(String, String)>;

    /// Value for `key`, treating an empty string as unset
    fn value(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

/// Process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Configuration errors detected before anything runs
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is a required environment variable")]
    Missing { key: &'static str },

    #[error("SINK_PLUGIN_SYMBOL is required when a SINK_PLUGIN_PATH is provided")]
    PartialSink,

    #[error("Invalid FUNCTION_COMMAND: {0}")]
    InvalidCommand(#[from] CommandError),
}

/// Settings for the bounded invoker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of invocations running at once
    pub max_concurrent_invokers: usize,

    /// How long an invocation may wait for a free slot
    pub max_queue_wait: Duration,

    /// How long a single invocation may run
    pub max_execution_time: Duration,

    /// Function process to run per invocation
    pub command: CommandTemplate,

    /// Environment every function process starts from
    pub inherited_env: Vec<(String, String)>,
}

impl PoolConfig {
    /// Pool configuration with default policies
    pub fn new(command: CommandTemplate) -> Self {
        Self {
            max_concurrent_invokers: DEFAULT_MAX_CONCURRENT_INVOKERS,
            max_queue_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MILLIS),
            max_execution_time: Duration::from_millis(DEFAULT_MAX_EXEC_MILLIS),
            command,
            inherited_env: Vec::new(),
        }
    }

    /// Build from configuration. Only the command template can fail.
    pub fn from_source(config: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let raw = config.value(FUNCTION_COMMAND).ok_or(ConfigError::Missing {
            key: FUNCTION_COMMAND,
        })?;
        let command: CommandTemplate = raw.parse()?;

        Ok(Self {
            // Zero falls back like any other invalid value
            max_concurrent_invokers: config
                .value(MAX_FUNCTION_COUNT)
                .and_then(|raw| raw.parse::<NonZeroUsize>().ok())
                .map_or(DEFAULT_MAX_CONCURRENT_INVOKERS, NonZeroUsize::get),
            max_queue_wait: Duration::from_millis(override_or(
                config,
                MAX_WAIT_MILLIS,
                DEFAULT_MAX_WAIT_MILLIS,
            )),
            max_execution_time: Duration::from_millis(override_or(
                config,
                MAX_EXEC_MILLIS,
                DEFAULT_MAX_EXEC_MILLIS,
            )),
            command,
            inherited_env: config.vars(),
        })
    }
}

/// Parsed override for `key`, or `default` when unset or unparsable
fn override_or<T: FromStr>(config: &dyn ConfigSource, key: &str, default: T) -> T {
    config
        .value(key)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = PoolConfig::from_source(&source(&[(FUNCTION_COMMAND, "cat")])).unwrap();

        assert_eq!(config.max_concurrent_invokers, 8);
        assert_eq!(config.max_queue_wait, Duration::from_millis(500));
        assert_eq!(config.max_execution_time, Duration::from_millis(30_000));
        assert_eq!(config.command.program(), "cat");
    }

    #[test]
    fn test_overrides_are_independent() {
        let config = PoolConfig::from_source(&source(&[
            (FUNCTION_COMMAND, "cat"),
            (MAX_FUNCTION_COUNT, "3"),
            (MAX_EXEC_MILLIS, "1200"),
        ]))
        .unwrap();

        assert_eq!(config.max_concurrent_invokers, 3);
        assert_eq!(config.max_queue_wait, Duration::from_millis(500));
        assert_eq!(config.max_execution_time, Duration::from_millis(1200));
    }

    #[test]
    fn test_unparsable_overrides_fall_back_silently() {
        let config = PoolConfig::from_source(&source(&[
            (FUNCTION_COMMAND, "cat"),
            (MAX_FUNCTION_COUNT, "many"),
            (MAX_WAIT_MILLIS, "-5"),
            (MAX_EXEC_MILLIS, "30s"),
        ]))
        .unwrap();

        assert_eq!(config.max_concurrent_invokers, DEFAULT_MAX_CONCURRENT_INVOKERS);
        assert_eq!(config.max_queue_wait, Duration::from_millis(DEFAULT_MAX_WAIT_MILLIS));
        assert_eq!(
            config.max_execution_time,
            Duration::from_millis(DEFAULT_MAX_EXEC_MILLIS)
        );
    }

    #[test]
    fn test_zero_concurrency_keeps_default() {
        let config = PoolConfig::from_source(&source(&[
            (FUNCTION_COMMAND, "cat"),
            (MAX_FUNCTION_COUNT, "0"),
        ]))
        .unwrap();

        assert_eq!(config.max_concurrent_invokers, DEFAULT_MAX_CONCURRENT_INVOKERS);
    }

    #[test]
    fn test_empty_value_counts_as_unset() {
        let config = PoolConfig::from_source(&source(&[
            (FUNCTION_COMMAND, "cat"),
            (MAX_WAIT_MILLIS, ""),
        ]))
        .unwrap();
        assert_eq!(config.max_queue_wait, Duration::from_millis(500));

        let err = PoolConfig::from_source(&source(&[(FUNCTION_COMMAND, "")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: FUNCTION_COMMAND }));
    }

    #[test]
    fn test_malformed_command_is_fatal() {
        let err = PoolConfig::from_source(&source(&[(FUNCTION_COMMAND, "sh -c 'echo")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCommand(_)));
    }

    #[test]
    fn test_inherited_env_comes_from_source() {
        let config = PoolConfig::from_source(&source(&[
            (FUNCTION_COMMAND, "cat"),
            ("HOME", "/home/fn"),
        ]))
        .unwrap();

        assert!(config
            .inherited_env
            .contains(&("HOME".to_string(), "/home/fn".to_string())));
    }
}

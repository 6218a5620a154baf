//! Reactor pool configuration

use nio_core::constants::{DEFAULT_EVENT_CAPACITY, DEFAULT_SELECT_TIMEOUT_MS, MAX_WORKERS};
use nio_core::env::{env_get, env_get_opt};
use nio_core::ConfigError;
use std::time::Duration;

/// Configuration for a [`MultiWorkerReactor`](crate::MultiWorkerReactor)
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// How long each worker blocks in the selector before re-checking
    /// its shutdown flag (default: 1s)
    pub select_timeout: Duration,

    /// Number of reactors / worker threads (defaults to CPU count)
    pub worker_count: usize,

    /// Readiness events drained per poll call
    pub event_capacity: usize,

    /// Worker threads are named `{prefix}-{index}`
    pub thread_name_prefix: String,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            select_timeout: Duration::from_millis(DEFAULT_SELECT_TIMEOUT_MS),
            worker_count: num_cpus.min(MAX_WORKERS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            thread_name_prefix: "nio-worker".to_string(),
        }
    }
}

impl ReactorConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables:
    ///
    /// - `NIO_WORKER_COUNT`
    /// - `NIO_SELECT_TIMEOUT_MS`
    /// - `NIO_EVENT_CAPACITY`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let select_timeout = env_get_opt::<u64>("NIO_SELECT_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.select_timeout);
        Self {
            select_timeout,
            worker_count: env_get("NIO_WORKER_COUNT", defaults.worker_count),
            event_capacity: env_get("NIO_EVENT_CAPACITY", defaults.event_capacity),
            thread_name_prefix: defaults.thread_name_prefix,
        }
    }

    /// Set selector poll granularity
    pub fn select_timeout(mut self, d: Duration) -> Self {
        self.select_timeout = d;
        self
    }

    /// Set number of workers
    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    /// Set per-poll event capacity
    pub fn event_capacity(mut self, n: usize) -> Self {
        self.event_capacity = n;
        self
    }

    /// Set worker thread name prefix
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.worker_count > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                requested: self.worker_count,
                max: MAX_WORKERS,
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ReactorConfig::default();
        assert!(config.worker_count >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ReactorConfig::new().worker_count(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroWorkers));
    }

    #[test]
    fn test_too_many_workers_rejected() {
        let config = ReactorConfig::new().worker_count(MAX_WORKERS + 1);
        assert!(matches!(config.validate(), Err(ConfigError::TooManyWorkers { .. })));
    }

    #[test]
    fn test_builder() {
        let config = ReactorConfig::new()
            .worker_count(3)
            .select_timeout(Duration::from_millis(5))
            .event_capacity(64)
            .thread_name_prefix("io");
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.select_timeout, Duration::from_millis(5));
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.thread_name_prefix, "io");
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("NIO_SELECT_TIMEOUT_MS", "25");
        std::env::set_var("NIO_EVENT_CAPACITY", "128");
        let config = ReactorConfig::from_env();
        assert_eq!(config.select_timeout, Duration::from_millis(25));
        assert_eq!(config.event_capacity, 128);
        std::env::remove_var("NIO_SELECT_TIMEOUT_MS");
        std::env::remove_var("NIO_EVENT_CAPACITY");
    }
}

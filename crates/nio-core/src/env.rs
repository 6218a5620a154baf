//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `ReactorConfig::from_env()`.
//!
//! ```ignore
//! use nio_core::env::{env_get, env_get_opt};
//!
//! let workers: usize = env_get("NIO_WORKER_COUNT", 4);
//! let timeout: Option<u64> = env_get_opt("NIO_SELECT_TIMEOUT_MS");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

//! # nio-core
//!
//! Shared vocabulary for the reactor core. No I/O happens here.
//!
//! ## Modules
//!
//! - `error` - Error taxonomy (config, reactor, content type, entity)
//! - `status` - Reactor lifecycle status
//! - `capacity` - Capacity feedback channel for flow control
//! - `executor` - Execution seam for blocking consumption work
//! - `content_type` - Media type and charset parsing
//! - `header` - Name/value pairs for trailers
//! - `env` - Environment variable utilities

pub mod error;
pub mod status;
pub mod capacity;
pub mod executor;
pub mod content_type;
pub mod header;
pub mod env;

pub use error::{
    ConfigError, ContentTypeError, EntityError, EntityResult, ExecuteError, PoolError,
    ReactorError, ReactorResult,
};
pub use status::ReactorStatus;
pub use capacity::CapacityChannel;
pub use executor::{Executor, RejectedTask, Task};
pub use content_type::{Charset, ContentType};
pub use header::Header;
pub use env::{env_get, env_get_opt};

/// Constants shared across crates
pub mod constants {
    /// Maximum workers (OS threads) per reactor pool
    pub const MAX_WORKERS: usize = 256;

    /// Default selector poll granularity in milliseconds
    pub const DEFAULT_SELECT_TIMEOUT_MS: u64 = 1000;

    /// Default number of readiness events drained per poll
    pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
}

//! Error taxonomy for the reactor core.
//!
//! Four families, matching where a failure is observed:
//!
//! - [`ConfigError`]: bad construction parameters. Fail fast, never retried.
//! - [`ReactorError`]: reactor-level failures, recorded per worker and
//!   surfaced only through `verify_workers()`.
//! - [`ContentTypeError`]: raised synchronously by `stream_start()`.
//! - [`EntityError`]: everything on the entity consumption path.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Invalid construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("worker count may not be negative or zero")]
    ZeroWorkers,

    #[error("worker count {requested} exceeds maximum {max}")]
    TooManyWorkers { requested: usize, max: usize },

    #[error("event capacity may not be zero")]
    ZeroEventCapacity,

    #[error("buffer size may not be zero")]
    ZeroBufferSize,

    #[error("queue depth may not be zero")]
    ZeroQueueDepth,
}

/// Reactor-level failure.
///
/// Cloneable so a cause recorded by a worker thread can be handed out by
/// `verify_workers()` without consuming it.
#[derive(Debug, Clone, Error)]
pub enum ReactorError {
    /// Selector or registration I/O failure.
    #[error("I/O reactor failure: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The reactor loop was interrupted.
    #[error("I/O reactor interrupted: {0}")]
    Interrupted(String),

    /// An event dispatch handler failed.
    #[error("event dispatch failed: {0}")]
    Dispatch(String),

    /// The worker thread panicked while running its reactor.
    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    /// An OS thread could not be spawned.
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: Arc<io::Error>,
    },

    /// `execute()` was called on a reactor whose selector is already in use.
    #[error("I/O reactor {0} has already been executed")]
    AlreadyExecuted(usize),

    /// `start_workers()` was called on a pool that is not inactive.
    #[error("worker pool has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ReactorError {
    /// Whether this cause belongs to the interruption category.
    ///
    /// Workers record interruptions separately from other failures;
    /// `verify_workers()` prefers the latter.
    pub fn is_interruption(&self) -> bool {
        matches!(self, ReactorError::Interrupted(_))
    }
}

impl From<io::Error> for ReactorError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::Interrupted {
            ReactorError::Interrupted(e.to_string())
        } else {
            ReactorError::Io(Arc::new(e))
        }
    }
}

/// Malformed or unsupported declared content type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentTypeError {
    #[error("invalid content type: {0:?}")]
    Invalid(String),

    /// Surfaced to callers as an encoding error.
    #[error("unsupported encoding: {0}")]
    UnsupportedCharset(String),
}

/// Failure on the entity consumption path.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    ContentType(#[from] ContentTypeError),

    /// The producer delivered more bytes than were advertised.
    #[error("flow control violation: {delivered} bytes delivered, {granted} granted")]
    FlowControl { delivered: usize, granted: usize },

    /// The producer delivered bytes after declaring end of stream.
    #[error("entity stream already ended")]
    StreamEnded,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The executor refused the consumption task.
    #[error("consumption task rejected: {0}")]
    Rejected(#[from] ExecuteError),

    /// The consumption task was dropped or panicked before producing a result.
    #[error("consumption task abandoned: {0}")]
    Abandoned(String),

    /// Failure raised by consumer-specific logic.
    #[error("{0}")]
    Consumer(String),
}

/// Why an [`Executor`](crate::executor::Executor) refused a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
    #[error("executor queue is full")]
    QueueFull,

    #[error("executor is shut down")]
    Shutdown,
}

/// Failure to build an executor pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn executor thread {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
}

pub type ReactorResult<T> = std::result::Result<T, ReactorError>;
pub type EntityResult<T> = std::result::Result<T, EntityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_interrupted_maps_to_interruption() {
        let e: ReactorError = io::Error::new(io::ErrorKind::Interrupted, "signal").into();
        assert!(e.is_interruption());

        let e: ReactorError = io::Error::new(io::ErrorKind::Other, "epoll").into();
        assert!(!e.is_interruption());
        assert!(matches!(e, ReactorError::Io(_)));
    }

    #[test]
    fn test_pool_error_display() {
        let e = PoolError::from(ConfigError::ZeroQueueDepth);
        assert_eq!(e.to_string(), "queue depth may not be zero");
        let e = PoolError::Spawn {
            worker: 2,
            source: io::Error::new(io::ErrorKind::OutOfMemory, "no threads"),
        };
        assert_eq!(e.to_string(), "failed to spawn executor thread 2: no threads");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::ZeroWorkers.to_string(),
            "worker count may not be negative or zero"
        );
        let e = EntityError::from(ContentTypeError::UnsupportedCharset("x-klingon".into()));
        assert_eq!(e.to_string(), "unsupported encoding: x-klingon");
        let e = EntityError::FlowControl { delivered: 10, granted: 4 };
        assert_eq!(e.to_string(), "flow control violation: 10 bytes delivered, 4 granted");
    }

    #[test]
    fn test_reactor_error_is_cloneable() {
        let e: ReactorError = io::Error::new(io::ErrorKind::Other, "boom").into();
        let copy = e.clone();
        assert_eq!(e.to_string(), copy.to_string());
    }
}

//! Execution abstraction for blocking consumption work.
//!
//! Entity consumers never block an I/O thread. Everything that reads
//! from a shared buffer is handed to an `Executor` supplied by the caller.
//!
//! # Implementors
//!
//! - `FixedPool` (nio-entity): N OS threads over a bounded queue.
//! - Any caller-owned pool, by implementing this trait.

use crate::error::ExecuteError;
use core::fmt;

/// A unit of blocking work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A task the executor refused, handed back to the caller unrun.
pub struct RejectedTask {
    pub task: Task,
    pub reason: ExecuteError,
}

impl fmt::Debug for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedTask")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Runs tasks on threads that are allowed to block.
///
/// **Contract:**
/// - `execute()` must NEVER block the caller; it is invoked from I/O
///   threads.
/// - A refused task is returned in `RejectedTask`, not dropped, so the
///   caller decides how to resolve it.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task) -> Result<(), RejectedTask>;
}

//! Worker thread management
//!
//! One OS thread per selector reactor. The thread runs the reactor loop
//! and, whatever way the loop ends, records the cause and makes a
//! best-effort attempt to shut its reactor down. Causes are never
//! surfaced proactively; the pool reads them in `verify_workers()`.

use crate::dispatch::IoEventDispatch;
use crate::selector::SelectorReactor;

use nio_core::ReactorError;

use mio::event::Source;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// State shared between a worker thread and the pool.
#[derive(Default)]
struct WorkerShared {
    reactor_error: Mutex<Option<ReactorError>>,
    interrupted: Mutex<Option<ReactorError>>,
    done: Mutex<bool>,
    done_cv: Condvar,
}

impl WorkerShared {
    fn record(&self, cause: ReactorError) {
        if cause.is_interruption() {
            *self.interrupted.lock() = Some(cause);
        } else {
            *self.reactor_error.lock() = Some(cause);
        }
    }

    /// Record `cause` only if no earlier failure was recorded.
    fn record_if_first(&self, cause: ReactorError) {
        let mut slot = self.reactor_error.lock();
        if slot.is_none() {
            *slot = Some(cause);
        }
    }
}

/// Marks the worker finished even if the thread unwinds.
struct DoneGuard<'a>(&'a WorkerShared);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        *self.0.done.lock() = true;
        self.0.done_cv.notify_all();
    }
}

/// Handle to one running worker.
pub(crate) struct WorkerThread {
    index: usize,
    handle: Option<JoinHandle<()>>,
    shared: Arc<WorkerShared>,
}

impl WorkerThread {
    /// Spawn a thread running `reactor` against `dispatch`.
    pub(crate) fn spawn<C>(
        index: usize,
        name: String,
        reactor: Arc<SelectorReactor<C>>,
        dispatch: Arc<dyn IoEventDispatch<C>>,
    ) -> Result<Self, ReactorError>
    where
        C: Source + Send + 'static,
    {
        let shared = Arc::new(WorkerShared::default());
        let thread_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(index, &reactor, &*dispatch, &thread_shared))
            .map_err(|e| ReactorError::Spawn {
                worker: index,
                source: Arc::new(e),
            })?;

        Ok(Self {
            index,
            handle: Some(handle),
            shared,
        })
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn is_alive(&self) -> bool {
        !*self.shared.done.lock()
    }

    /// Wait up to `timeout` for the thread to finish.
    ///
    /// Returns `false` if it is still running; the thread is then left
    /// alone, there is no forced termination.
    /// A timeout too large to form a deadline waits without one.
    pub(crate) fn join_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let finished = {
            let mut done = self.shared.done.lock();
            while !*done {
                match deadline {
                    Some(deadline) => {
                        if self.shared.done_cv.wait_until(&mut done, deadline).timed_out() {
                            break;
                        }
                    }
                    None => self.shared.done_cv.wait(&mut done),
                }
            }
            *done
        };
        if finished {
            if let Some(handle) = self.handle.take() {
                // Panics are caught inside `run`, join cannot fail here
                let _ = handle.join();
            }
        }
        finished
    }

    pub(crate) fn reactor_error(&self) -> Option<ReactorError> {
        self.shared.reactor_error.lock().clone()
    }

    pub(crate) fn interrupted_error(&self) -> Option<ReactorError> {
        self.shared.interrupted.lock().clone()
    }
}

/// Worker thread main body.
fn run<C>(
    index: usize,
    reactor: &SelectorReactor<C>,
    dispatch: &dyn IoEventDispatch<C>,
    shared: &WorkerShared,
) where
    C: Source + Send + 'static,
{
    let _done = DoneGuard(shared);

    match panic::catch_unwind(AssertUnwindSafe(|| reactor.execute(dispatch))) {
        Ok(Ok(())) => debug!(worker = index, "worker exited"),
        Ok(Err(cause)) => {
            if cause.is_interruption() {
                warn!(worker = index, error = %cause, "worker interrupted");
            } else {
                error!(worker = index, error = %cause, "worker reactor failed");
            }
            shared.record(cause);
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(worker = index, %message, "worker panicked");
            shared.record(ReactorError::WorkerPanicked {
                worker: index,
                message,
            });
        }
    }

    if let Err(cause) = reactor.shutdown() {
        debug!(worker = index, error = %cause, "reactor shutdown after exit failed");
        shared.record_if_first(cause);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

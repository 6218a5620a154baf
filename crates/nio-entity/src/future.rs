//! One-shot result delivery.
//!
//! A consumption resolves exactly once, through a boxed callback. When
//! the caller would rather wait for the value, [`result_channel`] pairs
//! such a callback with a blocking [`ResultFuture`].

use nio_core::{EntityError, EntityResult};

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Receives the single outcome of a consumption.
pub type ResultCallback<T> = Box<dyn FnOnce(EntityResult<T>) + Send + 'static>;

/// Build a callback and the future it resolves.
///
/// If the callback is dropped without being called, the future resolves
/// to [`EntityError::Abandoned`].
pub fn result_channel<T: Send + 'static>() -> (ResultCallback<T>, ResultFuture<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    let callback: ResultCallback<T> = Box::new(move |result| {
        // Receiver gone means nobody is waiting any more
        let _ = tx.send(result);
    });
    (callback, ResultFuture { rx })
}

/// Blocking handle on a pending result.
pub struct ResultFuture<T> {
    rx: Receiver<EntityResult<T>>,
}

impl<T> ResultFuture<T> {
    /// Block until resolved.
    pub fn wait(self) -> EntityResult<T> {
        self.rx.recv().unwrap_or_else(|_| Err(abandoned()))
    }

    /// Block up to `timeout`. `None` if still pending, and the future is
    /// consumed either way.
    pub fn wait_timeout(self, timeout: Duration) -> Option<EntityResult<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(abandoned())),
        }
    }
}

impl<T> fmt::Debug for ResultFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFuture").finish_non_exhaustive()
    }
}

fn abandoned() -> EntityError {
    EntityError::Abandoned("result callback dropped without a result".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolves_across_threads() {
        let (callback, future) = result_channel::<u32>();
        thread::spawn(move || callback(Ok(7)));
        assert_eq!(future.wait().unwrap(), 7);
    }

    #[test]
    fn test_dropped_callback_is_abandoned() {
        let (callback, future) = result_channel::<u32>();
        drop(callback);
        assert!(matches!(future.wait(), Err(EntityError::Abandoned(_))));
    }

    #[test]
    fn test_wait_timeout_pending() {
        let (_callback, future) = result_channel::<u32>();
        assert!(future.wait_timeout(Duration::from_millis(10)).is_none());
    }
}

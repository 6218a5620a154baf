//! # Entity consumer: classic blocking logic behind an async seam
//!
//! The protocol engine drives an [`AsyncEntityConsumer`] from an I/O
//! thread: it starts the stream, pushes body chunks, asks for capacity and
//! ends the stream. None of those calls block. [`EntityConsumer`] adapts
//! that surface to a [`ClassicEntityConsumer`], which reads the body as a
//! plain blocking [`Read`](std::io::Read) on an executor thread.
//!
//! ## State machine
//!
//! ```text
//!   IDLE ──stream_start (CAS)──▶ ACTIVE ──task finishes──▶ COMPLETED
//!    │
//!    └─ content type rejected: stays IDLE, nothing dispatched
//! ```
//!
//! **Contract:**
//! - The content type is parsed before any transition. A parse failure is
//!   returned from `stream_start()` and the consumer stays `Idle`.
//! - `Idle → Active` happens at most once. Later `stream_start()` calls
//!   are no-ops and their callbacks are dropped uninvoked.
//! - Once `Active`, the callback is invoked exactly once and the state
//!   reaches `Completed`, whether the logic succeeds, fails, panics, the
//!   executor refuses the task or drops it unrun.
//! - On any failure the shared buffer is aborted so the producer side
//!   stops expecting capacity updates.

use crate::future::ResultCallback;
use crate::input_stream::ContentInputStream;
use crate::shared_buffer::SharedInputBuffer;

use nio_core::{
    CapacityChannel, ConfigError, ContentType, EntityError, EntityResult, Executor, Header,
    RejectedTask, Task,
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of one [`EntityConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    Idle = 0,
    Active = 1,
    Completed = 2,
}

impl From<u8> for ConsumerState {
    fn from(v: u8) -> Self {
        match v {
            0 => ConsumerState::Idle,
            1 => ConsumerState::Active,
            _ => ConsumerState::Completed,
        }
    }
}

impl From<ConsumerState> for u8 {
    fn from(s: ConsumerState) -> u8 {
        s as u8
    }
}

/// What a protocol engine sees of a body consumer.
///
/// Every method is called from an I/O thread and must not block.
pub trait AsyncEntityConsumer<T>: Send + Sync {
    /// Begin consumption of a body declared as `content_type`.
    fn stream_start(
        &self,
        content_type: Option<&str>,
        callback: ResultCallback<T>,
    ) -> EntityResult<()>;

    /// Bytes that can be absorbed right now.
    fn capacity(&self) -> usize;

    fn update_capacity(&self, channel: Arc<dyn CapacityChannel>) -> io::Result<()>;

    /// Deliver the next chunk of the body.
    fn consume(&self, src: &[u8]) -> EntityResult<()>;

    /// No more body bytes. Trailers are accepted but not merged into the
    /// result.
    fn stream_end(&self, trailers: &[Header]) -> EntityResult<()>;

    /// The exchange failed on the protocol side.
    fn failed(&self, cause: &EntityError);

    fn release_resources(&self) {}
}

/// Blocking body consumption, run once on an executor thread.
pub trait ClassicEntityConsumer: Send + 'static {
    type Output: Send + 'static;

    /// Read the body from `input` and produce the result.
    fn consume_data(
        self,
        content_type: Option<&ContentType>,
        input: &mut ContentInputStream,
    ) -> EntityResult<Self::Output>;
}

/// Drives a [`ClassicEntityConsumer`] through the IDLE/ACTIVE/COMPLETED
/// state machine.
pub struct EntityConsumer<C: ClassicEntityConsumer> {
    executor: Arc<dyn Executor>,
    buffer: Arc<SharedInputBuffer>,
    state: Arc<AtomicU8>,
    logic: Mutex<Option<C>>,
}

impl<C: ClassicEntityConsumer> EntityConsumer<C> {
    /// `initial_buffer_size` bounds how much of the body may be buffered
    /// ahead of the consumer; it is also the initial flow-control window.
    pub fn new(
        initial_buffer_size: usize,
        executor: Arc<dyn Executor>,
        logic: C,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            executor,
            buffer: Arc::new(SharedInputBuffer::new(initial_buffer_size)?),
            state: Arc::new(AtomicU8::new(ConsumerState::Idle as u8)),
            logic: Mutex::new(Some(logic)),
        })
    }

    #[inline]
    pub fn state(&self) -> ConsumerState {
        ConsumerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn buffer(&self) -> &Arc<SharedInputBuffer> {
        &self.buffer
    }
}

impl<C: ClassicEntityConsumer> AsyncEntityConsumer<C::Output> for EntityConsumer<C> {
    fn stream_start(
        &self,
        content_type: Option<&str>,
        callback: ResultCallback<C::Output>,
    ) -> EntityResult<()> {
        let content_type = ContentType::parse_optional(content_type)?;

        if self
            .state
            .compare_exchange(
                ConsumerState::Idle as u8,
                ConsumerState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!("entity stream already started");
            return Ok(());
        }

        let completion = Completion::new(Arc::clone(&self.buffer), Arc::clone(&self.state), callback);
        let Some(logic) = self.logic.lock().take() else {
            // The CAS above is the only path that takes the logic
            completion.resolve(Err(EntityError::Abandoned("consumer logic missing".into())));
            return Ok(());
        };

        let guard = completion.guard();
        let buffer = Arc::clone(&self.buffer);
        let task: Task = Box::new(move || {
            let mut input = ContentInputStream::new(buffer);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                logic.consume_data(content_type.as_ref(), &mut input)
            }));
            match outcome {
                Ok(result) => guard.complete(result),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(%message, "entity consumer panicked");
                    guard.complete(Err(EntityError::Abandoned(message)));
                }
            }
        });

        if let Err(RejectedTask { task, reason }) = self.executor.execute(task) {
            warn!(%reason, "executor rejected entity consumption");
            completion.resolve(Err(EntityError::Rejected(reason)));
            drop(task);
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buffer.available()
    }

    fn update_capacity(&self, channel: Arc<dyn CapacityChannel>) -> io::Result<()> {
        self.buffer.update_capacity(channel)
    }

    fn consume(&self, src: &[u8]) -> EntityResult<()> {
        self.buffer.fill(src)
    }

    fn stream_end(&self, _trailers: &[Header]) -> EntityResult<()> {
        self.buffer.mark_end_stream();
        Ok(())
    }

    fn failed(&self, cause: &EntityError) {
        debug!(error = %cause, "entity exchange failed");
        self.buffer.abort();
    }
}

// ── Completion ──

/// Single-resolution slot shared by the scheduled task and the
/// submitting thread.
struct Completion<T> {
    callback: Mutex<Option<ResultCallback<T>>>,
    buffer: Arc<SharedInputBuffer>,
    state: Arc<AtomicU8>,
}

impl<T> Completion<T> {
    fn new(
        buffer: Arc<SharedInputBuffer>,
        state: Arc<AtomicU8>,
        callback: ResultCallback<T>,
    ) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(Some(callback)),
            buffer,
            state,
        })
    }

    fn guard(self: &Arc<Self>) -> CompletionGuard<T> {
        CompletionGuard(Arc::clone(self))
    }

    /// First call wins; later calls are ignored.
    fn resolve(&self, result: EntityResult<T>) {
        let Some(callback) = self.callback.lock().take() else {
            return;
        };
        if result.is_err() {
            self.buffer.abort();
        }
        self.state
            .store(ConsumerState::Completed as u8, Ordering::Release);
        callback(result);
    }
}

/// Travels inside the task. If the task is dropped unrun, the consumer
/// still completes with `Abandoned`.
struct CompletionGuard<T>(Arc<Completion<T>>);

impl<T> CompletionGuard<T> {
    fn complete(self, result: EntityResult<T>) {
        self.0.resolve(result);
    }
}

impl<T> Drop for CompletionGuard<T> {
    fn drop(&mut self) {
        self.0.resolve(Err(EntityError::Abandoned(
            "consumption task dropped before completion".into(),
        )));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "consumer panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::BytesConsumer;
    use crate::future::result_channel;
    use crate::pool::FixedPool;
    use nio_core::{ContentTypeError, ExecuteError};
    use std::io::Read;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    /// Runs every task on a fresh thread and counts dispatches.
    #[derive(Default)]
    struct SpawningExecutor {
        dispatched: AtomicUsize,
    }

    impl Executor for SpawningExecutor {
        fn execute(&self, task: Task) -> Result<(), RejectedTask> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            thread::spawn(task);
            Ok(())
        }
    }

    struct RejectingExecutor;

    impl Executor for RejectingExecutor {
        fn execute(&self, task: Task) -> Result<(), RejectedTask> {
            Err(RejectedTask {
                task,
                reason: ExecuteError::Shutdown,
            })
        }
    }

    /// Accepts tasks and silently drops them.
    struct DroppingExecutor;

    impl Executor for DroppingExecutor {
        fn execute(&self, task: Task) -> Result<(), RejectedTask> {
            drop(task);
            Ok(())
        }
    }

    struct FailingConsumer;

    impl ClassicEntityConsumer for FailingConsumer {
        type Output = ();

        fn consume_data(
            self,
            _content_type: Option<&ContentType>,
            _input: &mut ContentInputStream,
        ) -> EntityResult<()> {
            Err(EntityError::Consumer("malformed body".into()))
        }
    }

    struct PanickingConsumer;

    impl ClassicEntityConsumer for PanickingConsumer {
        type Output = ();

        fn consume_data(
            self,
            _content_type: Option<&ContentType>,
            _input: &mut ContentInputStream,
        ) -> EntityResult<()> {
            panic!("consumer bug");
        }
    }

    /// Reports the declared mime type and the body length.
    struct MimeConsumer;

    impl ClassicEntityConsumer for MimeConsumer {
        type Output = (Option<String>, usize);

        fn consume_data(
            self,
            content_type: Option<&ContentType>,
            input: &mut ContentInputStream,
        ) -> EntityResult<Self::Output> {
            let mut body = Vec::new();
            input.read_to_end(&mut body)?;
            Ok((content_type.map(|ct| ct.mime_type().to_string()), body.len()))
        }
    }

    fn wait_for_state<C: ClassicEntityConsumer>(consumer: &EntityConsumer<C>, want: ConsumerState) {
        let deadline = std::time::Instant::now() + WAIT;
        while consumer.state() != want {
            assert!(std::time::Instant::now() < deadline, "state never reached {:?}", want);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_consumer_state_from_u8() {
        assert_eq!(ConsumerState::from(0u8), ConsumerState::Idle);
        assert_eq!(ConsumerState::from(1u8), ConsumerState::Active);
        assert_eq!(ConsumerState::from(2u8), ConsumerState::Completed);
        assert_eq!(u8::from(ConsumerState::Active), 1);
    }

    #[test]
    fn test_consume_sequence_then_end() {
        let pool = Arc::new(FixedPool::new(2, 8).unwrap());
        let consumer = EntityConsumer::new(16, pool.clone(), BytesConsumer::new()).unwrap();

        let (callback, future) = result_channel();
        consumer.stream_start(Some("application/octet-stream"), callback).unwrap();
        consumer.consume(&[0xb1, 0xb2, 0xb3]).unwrap();
        consumer.stream_end(&[]).unwrap();

        assert_eq!(future.wait_timeout(WAIT).unwrap().unwrap(), vec![0xb1, 0xb2, 0xb3]);
        assert_eq!(consumer.state(), ConsumerState::Completed);
        pool.join();
    }

    #[test]
    fn test_content_type_reaches_logic() {
        let executor = Arc::new(SpawningExecutor::default());
        let consumer = EntityConsumer::new(64, executor, MimeConsumer).unwrap();
        let (callback, future) = result_channel();
        consumer.stream_start(Some("text/plain; charset=utf-8"), callback).unwrap();
        consumer.consume(b"abcd").unwrap();
        consumer.stream_end(&[Header::new("x-checksum", "0")]).unwrap();

        let (mime, len) = future.wait_timeout(WAIT).unwrap().unwrap();
        assert_eq!(mime.as_deref(), Some("text/plain"));
        assert_eq!(len, 4);
    }

    #[test]
    fn test_failed_wakes_blocked_consumer() {
        let executor = Arc::new(SpawningExecutor::default());
        let consumer = EntityConsumer::new(16, executor, BytesConsumer::new()).unwrap();
        let (callback, future) = result_channel();
        consumer.stream_start(None, callback).unwrap();
        consumer.consume(b"partial").unwrap();

        // Consumer thread is now blocked waiting for more
        thread::sleep(Duration::from_millis(50));
        assert_eq!(consumer.state(), ConsumerState::Active);

        consumer.failed(&EntityError::Consumer("peer reset".into()));
        match future.wait_timeout(WAIT).expect("blocked read was not woken") {
            Err(EntityError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted),
            other => panic!("expected aborted read, got {:?}", other),
        }
        assert_eq!(consumer.state(), ConsumerState::Completed);
    }

    #[test]
    fn test_unsupported_charset_fails_synchronously() {
        let executor = Arc::new(SpawningExecutor::default());
        let consumer = EntityConsumer::new(16, executor.clone(), BytesConsumer::new()).unwrap();
        let (callback, _future) = result_channel();

        let err = consumer
            .stream_start(Some("text/plain; charset=x-klingon"), callback)
            .unwrap_err();
        assert!(matches!(
            err,
            EntityError::ContentType(ContentTypeError::UnsupportedCharset(_))
        ));
        assert!(err.to_string().starts_with("unsupported encoding"));
        assert_eq!(consumer.state(), ConsumerState::Idle);
        assert_eq!(executor.dispatched.load(Ordering::SeqCst), 0);

        // Still startable after the rejected attempt
        let (callback, future) = result_channel();
        consumer.stream_start(Some("text/plain"), callback).unwrap();
        consumer.stream_end(&[]).unwrap();
        assert_eq!(future.wait_timeout(WAIT).unwrap().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_concurrent_stream_start_dispatches_once() {
        let executor = Arc::new(SpawningExecutor::default());
        let consumer = Arc::new(EntityConsumer::new(16, executor.clone(), BytesConsumer::new()).unwrap());
        consumer.consume(b"xyz").unwrap();
        consumer.stream_end(&[]).unwrap();

        let starters = 8;
        let barrier = Arc::new(Barrier::new(starters));
        let handles: Vec<_> = (0..starters)
            .map(|_| {
                let consumer = Arc::clone(&consumer);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let (callback, future) = result_channel();
                    barrier.wait();
                    consumer.stream_start(None, callback).unwrap();
                    future.wait_timeout(WAIT)
                })
            })
            .collect();

        let mut resolved_ok = 0;
        let mut abandoned = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Some(Ok(body)) => {
                    assert_eq!(body, b"xyz".to_vec());
                    resolved_ok += 1;
                }
                Some(Err(EntityError::Abandoned(_))) => abandoned += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(resolved_ok, 1);
        assert_eq!(abandoned, starters - 1);
        assert_eq!(executor.dispatched.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_aborts_buffer() {
        let executor = Arc::new(SpawningExecutor::default());
        let consumer = EntityConsumer::new(16, executor, FailingConsumer).unwrap();
        let (callback, future) = result_channel();
        consumer.stream_start(None, callback).unwrap();

        let result = future.wait_timeout(WAIT).unwrap();
        assert!(matches!(result, Err(EntityError::Consumer(ref m)) if m == "malformed body"));
        assert!(consumer.buffer().is_aborted());
        assert_eq!(consumer.state(), ConsumerState::Completed);
        // Producer side keeps working without error after abort
        assert!(consumer.consume(b"late").is_ok());
    }

    #[test]
    fn test_panic_reported_once() {
        let executor = Arc::new(SpawningExecutor::default());
        let consumer = EntityConsumer::new(16, executor, PanickingConsumer).unwrap();
        let (callback, future) = result_channel();
        consumer.stream_start(None, callback).unwrap();

        match future.wait_timeout(WAIT).unwrap() {
            Err(EntityError::Abandoned(message)) => assert_eq!(message, "consumer bug"),
            other => panic!("expected abandoned, got {:?}", other),
        }
        assert!(consumer.buffer().is_aborted());
        wait_for_state(&consumer, ConsumerState::Completed);
    }

    #[test]
    fn test_rejected_task_resolves_callback() {
        let consumer =
            EntityConsumer::new(16, Arc::new(RejectingExecutor), BytesConsumer::new()).unwrap();
        let (callback, future) = result_channel();
        consumer.stream_start(None, callback).unwrap();

        assert!(matches!(
            future.wait_timeout(WAIT).unwrap(),
            Err(EntityError::Rejected(ExecuteError::Shutdown))
        ));
        assert_eq!(consumer.state(), ConsumerState::Completed);
        assert!(consumer.buffer().is_aborted());
    }

    #[test]
    fn test_dropped_task_resolves_callback() {
        let consumer =
            EntityConsumer::new(16, Arc::new(DroppingExecutor), BytesConsumer::new()).unwrap();
        let (callback, future) = result_channel();
        consumer.stream_start(None, callback).unwrap();

        assert!(matches!(
            future.wait_timeout(WAIT).unwrap(),
            Err(EntityError::Abandoned(_))
        ));
        assert_eq!(consumer.state(), ConsumerState::Completed);
    }

    #[test]
    fn test_capacity_pass_through() {
        let consumer =
            EntityConsumer::new(8, Arc::new(DroppingExecutor), BytesConsumer::new()).unwrap();
        assert_eq!(consumer.capacity(), 8);
        consumer.consume(&[1, 2, 3]).unwrap();
        assert_eq!(consumer.capacity(), 5);
        assert!(matches!(
            consumer.consume(&[0; 6]),
            Err(EntityError::FlowControl { delivered: 6, granted: 5 })
        ));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let result = EntityConsumer::new(0, Arc::new(DroppingExecutor), BytesConsumer::new());
        assert!(matches!(result, Err(ConfigError::ZeroBufferSize)));
    }
}

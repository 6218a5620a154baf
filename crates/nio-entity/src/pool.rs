//! `FixedPool`: default [`Executor`] implementation.
//!
//! Spawns N OS threads at creation. Workers dequeue boxed tasks from a
//! lock-free bounded queue and run them; tasks are expected to block
//! (that is what they are for). `execute()` never waits for a worker: a
//! full queue or a shut-down pool hands the task straight back.
//!
//! Idle workers sleep on a condvar. The shutdown flag is only flipped, and
//! tasks only accepted, under the same lock a worker holds when it decides
//! to exit, so every accepted task runs.
//!
//! No dynamic scaling.

use nio_core::{ConfigError, ExecuteError, Executor, PoolError, RejectedTask, Task};

use crossbeam_queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Shared state between submitters and workers.
struct PoolInner {
    /// Work queue: submitters → workers.
    queue: ArrayQueue<Task>,
    /// Number of workers currently running a task.
    active: AtomicUsize,
    shutdown: AtomicBool,
    /// Guards accept/exit decisions; idle workers wait on `work_ready`.
    gate: Mutex<()>,
    work_ready: Condvar,
    total: usize,
}

impl PoolInner {
    fn close(&self) {
        {
            let _gate = self.gate.lock();
            self.shutdown.store(true, Ordering::Release);
        }
        self.work_ready.notify_all();
    }
}

pub struct FixedPool {
    inner: Arc<PoolInner>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl FixedPool {
    /// Create a pool with `threads` workers.
    ///
    /// `queue_depth`: max pending tasks before `execute()` rejects.
    pub fn new(threads: usize, queue_depth: usize) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(ConfigError::ZeroWorkers.into());
        }
        if queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth.into());
        }

        let inner = Arc::new(PoolInner {
            queue: ArrayQueue::new(queue_depth),
            active: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            gate: Mutex::new(()),
            work_ready: Condvar::new(),
            total: threads,
        });

        let mut handles = Vec::with_capacity(threads);
        for worker_id in 0..threads {
            let worker_inner = Arc::clone(&inner);
            let spawned = thread::Builder::new()
                .name(format!("nio-exec-{}", worker_id))
                .spawn(move || worker_loop(worker_inner, worker_id));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    // Release the workers already running
                    inner.close();
                    return Err(PoolError::Spawn {
                        worker: worker_id,
                        source,
                    });
                }
            }
        }

        debug!(threads, queue_depth, "executor pool started");
        Ok(FixedPool {
            inner,
            handles: Mutex::new(handles),
        })
    }

    /// Default pool sizing: min(8, nproc/2), at least 2.
    pub fn auto_sized(queue_depth: usize) -> Result<Self, PoolError> {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new((cpus / 2).clamp(2, 8), queue_depth)
    }

    /// Workers currently running a task.
    pub fn active_tasks(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub fn total_threads(&self) -> usize {
        self.inner.total
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn shutdown(&self) {
        self.inner.close();
    }

    /// Shut down and wait for every worker to finish the queue.
    pub fn join(&self) {
        self.shutdown();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Executor for FixedPool {
    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        {
            let _gate = self.inner.gate.lock();
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(RejectedTask {
                    task,
                    reason: ExecuteError::Shutdown,
                });
            }
            self.inner.queue.push(task).map_err(|task| RejectedTask {
                task,
                reason: ExecuteError::QueueFull,
            })?;
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        // Workers drain the queue and exit; no join here so dropping
        // never blocks. Call join() for a synchronous stop.
        self.inner.close();
    }
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    loop {
        if let Some(task) = inner.queue.pop() {
            inner.active.fetch_add(1, Ordering::Relaxed);
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!(worker = worker_id, "executor task panicked");
            }
            inner.active.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        let mut gate = inner.gate.lock();
        if !inner.queue.is_empty() {
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        inner.work_ready.wait(&mut gate);
    }
    debug!(worker = worker_id, "executor worker exited");
}

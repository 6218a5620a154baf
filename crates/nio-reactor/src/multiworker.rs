//! # Multi-worker reactor pool
//!
//! N selector reactors, N dedicated OS threads, bound one-to-one for the
//! lifetime of the pool. Incoming channels are dealt out strictly
//! round-robin; there is no load or latency awareness and no resizing.
//!
//! ```text
//!              add_channel (single caller)
//!                        │  cursor++ mod N
//!        ┌───────────────┼───────────────┐
//!        ▼               ▼               ▼
//!   reactor[0]      reactor[1]  ...  reactor[N-1]
//!   worker-0        worker-1         worker-N-1
//! ```
//!
//! ## Failure model
//!
//! Workers never surface failures on their own. Each records its cause;
//! `verify_workers()` reports the first dead worker's recorded reactor
//! failure, falling back to its recorded interruption.
//!
//! A worker that outlives the `stop_workers()` timeout without recording
//! anything stays unresolved and `verify_workers()` reports nothing for it.
//! There is no forced termination.

use crate::config::ReactorConfig;
use crate::dispatch::IoEventDispatch;
use crate::selector::SelectorReactor;
use crate::session::ChannelEntry;
use crate::worker::WorkerThread;

use nio_core::{ReactorError, ReactorResult, ReactorStatus};

use mio::event::Source;
use mio::net::TcpStream;
use tracing::{debug, info, warn};

use std::sync::Arc;
use std::time::Duration;

/// Fixed-size pool of selector reactors.
///
/// `add_channel()` takes `&mut self`: the round-robin cursor is not
/// synchronized, so the pool is driven by one thread (typically the
/// acceptor). Callers sharing a pool across threads must wrap it in
/// their own lock.
pub struct MultiWorkerReactor<C = TcpStream> {
    config: ReactorConfig,
    reactors: Vec<Arc<SelectorReactor<C>>>,
    workers: Vec<WorkerThread>,
    current_worker: usize,
    status: ReactorStatus,
}

impl<C: Source + Send + 'static> MultiWorkerReactor<C> {
    /// Build the pool and one reactor per worker slot. No threads yet.
    pub fn new(config: ReactorConfig) -> ReactorResult<Self> {
        config.validate()?;

        let reactors = (0..config.worker_count)
            .map(|i| {
                SelectorReactor::new(i, config.select_timeout, config.event_capacity).map(Arc::new)
            })
            .collect::<ReactorResult<Vec<_>>>()?;

        debug!(workers = config.worker_count, "reactor pool created");

        Ok(Self {
            workers: Vec::with_capacity(config.worker_count),
            config,
            reactors,
            current_worker: 0,
            status: ReactorStatus::Inactive,
        })
    }

    /// Shorthand for `new()` with a worker count and select timeout.
    pub fn with_workers(worker_count: usize, select_timeout: Duration) -> ReactorResult<Self> {
        Self::new(
            ReactorConfig::new()
                .worker_count(worker_count)
                .select_timeout(select_timeout),
        )
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.reactors.len()
    }

    #[inline]
    pub fn status(&self) -> ReactorStatus {
        self.status
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    pub fn reactor(&self, index: usize) -> Option<&Arc<SelectorReactor<C>>> {
        self.reactors.get(index)
    }

    /// Number of worker threads still running.
    pub fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_alive()).count()
    }

    /// Hand `entry` to the next reactor in round-robin order.
    ///
    /// Returns the index of the worker it was assigned to.
    pub fn add_channel(&mut self, entry: ChannelEntry<C>) -> usize {
        let index = self.current_worker % self.reactors.len();
        self.current_worker = self.current_worker.wrapping_add(1);
        self.reactors[index].add_channel(entry);
        debug!(worker = index, "channel assigned");
        index
    }

    /// Spawn one thread per reactor, all sharing `dispatch`.
    ///
    /// Returns as soon as every thread is launched, not once they are
    /// polling.
    pub fn start_workers<D>(&mut self, dispatch: Arc<D>) -> ReactorResult<()>
    where
        D: IoEventDispatch<C> + 'static,
    {
        if self.status != ReactorStatus::Inactive {
            return Err(ReactorError::AlreadyStarted);
        }
        let dispatch: Arc<dyn IoEventDispatch<C>> = dispatch;

        for (i, reactor) in self.reactors.iter().enumerate() {
            let name = format!("{}-{}", self.config.thread_name_prefix, i);
            match WorkerThread::spawn(i, name, Arc::clone(reactor), Arc::clone(&dispatch)) {
                Ok(worker) => self.workers.push(worker),
                Err(e) => {
                    warn!(worker = i, error = %e, "worker spawn failed, shutting pool down");
                    for reactor in &self.reactors {
                        let _ = reactor.shutdown();
                    }
                    self.status = ReactorStatus::ShuttingDown;
                    return Err(e);
                }
            }
        }

        self.status = ReactorStatus::Active;
        info!(workers = self.workers.len(), "reactor pool started");
        Ok(())
    }

    /// Signal every reactor to shut down, then wait up to `timeout` for
    /// each worker thread in turn.
    ///
    /// Workers still running after their wait are left unresolved.
    pub fn stop_workers(&mut self, timeout: Duration) -> ReactorResult<()> {
        if self.status < ReactorStatus::ShuttingDown {
            self.status = ReactorStatus::ShuttingDown;
        }

        let mut first_error = None;
        for reactor in &self.reactors {
            if let Err(e) = reactor.shutdown() {
                warn!(worker = reactor.id(), error = %e, "reactor shutdown signal failed");
                first_error.get_or_insert(e);
            }
        }

        let mut unresolved = 0usize;
        for worker in &mut self.workers {
            if !worker.join_timeout(timeout) {
                warn!(worker = worker.index(), ?timeout, "worker did not terminate in time");
                unresolved += 1;
            }
        }

        if unresolved == 0 {
            self.status = ReactorStatus::ShutDown;
            info!("reactor pool stopped");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Report the failure of the first dead worker that recorded one.
    ///
    /// A recorded reactor failure is preferred over a recorded
    /// interruption. Workers that exited cleanly are not flagged.
    pub fn verify_workers(&self) -> ReactorResult<()> {
        for worker in &self.workers {
            if worker.is_alive() {
                continue;
            }
            if let Some(e) = worker.reactor_error() {
                return Err(e);
            }
            if let Some(e) = worker.interrupted_error() {
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<C> Drop for MultiWorkerReactor<C> {
    fn drop(&mut self) {
        // Signal only; joining here could block the dropping thread
        for reactor in &self.reactors {
            let _ = reactor.shutdown();
        }
    }
}

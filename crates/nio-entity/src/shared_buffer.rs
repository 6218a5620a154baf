//! # Shared input buffer: the backpressure bridge
//!
//! One bounded byte buffer shared by two concurrency domains:
//!
//! ```text
//!  I/O thread (never blocks)            consumer thread (may block)
//!  ─────────────────────────            ───────────────────────────
//!  fill(bytes)          ──▶  [ data ]  ──▶  read(&mut buf)
//!  mark_end_stream()                         └─ waits on condvar
//!  abort()                                      until data / end / abort
//!  update_capacity(ch)  ◀── freed space ──┘
//! ```
//!
//! ## Flow control
//!
//! The buffer tracks how many bytes the producer has been *granted* but
//! not yet delivered. At construction the whole buffer is granted (the
//! initial window). Afterwards grants only grow when the consumer frees
//! space, and only through the registered [`CapacityChannel`]:
//!
//! - `update_capacity()` advertises whatever freed space has not been
//!   advertised yet. Calling it twice in a row advertises nothing new.
//! - A read that empties the buffer advertises the freed space itself.
//!
//! Invariant: `buffered + granted <= capacity`. A `fill()` larger than the
//! outstanding grant is a flow-control violation and fails immediately.
//!
//! ## Termination
//!
//! Both flags are permanent. End of stream lets readers drain what is
//! buffered first. Abort fails every pending and future read with
//! `ConnectionAborted`, and bytes filled afterwards are discarded.

use nio_core::{CapacityChannel, ConfigError, EntityError, EntityResult};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

struct BufferState {
    data: VecDeque<u8>,
    capacity: usize,
    /// Bytes the producer may still deliver.
    granted: usize,
    end_stream: bool,
    aborted: bool,
    capacity_channel: Option<Arc<dyn CapacityChannel>>,
}

impl BufferState {
    /// Free space not yet advertised to the producer.
    #[inline]
    fn unadvertised(&self) -> usize {
        self.capacity
            .saturating_sub(self.data.len())
            .saturating_sub(self.granted)
    }
}

/// Bounded byte buffer with non-blocking producer operations and a
/// blocking consumer read.
pub struct SharedInputBuffer {
    state: Mutex<BufferState>,
    readable: Condvar,
}

impl SharedInputBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        Ok(Self {
            state: Mutex::new(BufferState {
                data: VecDeque::with_capacity(capacity),
                capacity,
                granted: capacity,
                end_stream: false,
                aborted: false,
                capacity_channel: None,
            }),
            readable: Condvar::new(),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Free space in bytes.
    pub fn available(&self) -> usize {
        let state = self.state.lock();
        state.capacity - state.data.len()
    }

    /// Bytes buffered and not yet read.
    pub fn length(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Bytes the producer may still deliver without a further update.
    pub fn granted(&self) -> usize {
        self.state.lock().granted
    }

    pub fn is_end_stream(&self) -> bool {
        self.state.lock().end_stream
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Register `channel` and advertise any freed, unadvertised space.
    ///
    /// No-op once the stream has ended or been aborted.
    pub fn update_capacity(&self, channel: Arc<dyn CapacityChannel>) -> io::Result<()> {
        let increment = {
            let mut state = self.state.lock();
            if state.end_stream || state.aborted {
                return Ok(());
            }
            state.capacity_channel = Some(Arc::clone(&channel));
            let increment = state.unadvertised();
            state.granted += increment;
            increment
        };

        if increment > 0 {
            if let Err(e) = channel.update(increment) {
                self.revoke(increment);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Producer side: append `src`. Never blocks.
    pub fn fill(&self, src: &[u8]) -> EntityResult<()> {
        {
            let mut state = self.state.lock();
            if state.aborted {
                return Ok(());
            }
            if state.end_stream {
                return Err(EntityError::StreamEnded);
            }
            if src.len() > state.granted {
                return Err(EntityError::FlowControl {
                    delivered: src.len(),
                    granted: state.granted,
                });
            }
            state.data.extend(src);
            state.granted -= src.len();
        }
        self.readable.notify_all();
        Ok(())
    }

    /// Producer side: no further bytes will arrive.
    pub fn mark_end_stream(&self) {
        {
            let mut state = self.state.lock();
            state.end_stream = true;
            state.capacity_channel = None;
        }
        self.readable.notify_all();
    }

    /// Abnormal termination. Wakes any blocked reader with an error.
    pub fn abort(&self) {
        {
            let mut state = self.state.lock();
            if state.aborted {
                return;
            }
            state.aborted = true;
            state.capacity_channel = None;
            state.data.clear();
        }
        debug!("shared input buffer aborted");
        self.readable.notify_all();
    }

    /// Consumer side: read into `dst`, blocking until data, end of stream
    /// or abort. Returns `Ok(0)` at end of stream.
    pub fn read(&self, dst: &mut [u8]) -> io::Result<usize> {
        let (n, replenish) = {
            let mut state = self.state.lock();
            loop {
                if state.aborted {
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "Aborted"));
                }
                if dst.is_empty() || !state.data.is_empty() || state.end_stream {
                    break;
                }
                self.readable.wait(&mut state);
            }

            let n = dst.len().min(state.data.len());
            for (slot, byte) in dst.iter_mut().zip(state.data.drain(..n)) {
                *slot = byte;
            }

            let mut replenish = None;
            if n > 0 && state.data.is_empty() {
                if let Some(channel) = state.capacity_channel.clone() {
                    let increment = state.unadvertised();
                    if increment > 0 {
                        state.granted += increment;
                        replenish = Some((channel, increment));
                    }
                }
            }
            (n, replenish)
        };

        if let Some((channel, increment)) = replenish {
            if let Err(e) = channel.update(increment) {
                warn!(increment, error = %e, "capacity update failed");
                self.revoke(increment);
            }
        }
        Ok(n)
    }

    fn revoke(&self, increment: usize) {
        let mut state = self.state.lock();
        state.granted = state.granted.saturating_sub(increment);
    }
}

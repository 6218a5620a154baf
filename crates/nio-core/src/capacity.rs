//! Capacity feedback from a consumer buffer toward the producer.
//!
//! A `CapacityChannel` is how a buffer tells the protocol engine that it
//! can absorb more bytes, e.g. so an HTTP/2 engine can emit a
//! WINDOW_UPDATE for the stream.
//!
//! **Contract:**
//! - `update()` must NEVER block. It may be called from a consumer
//!   execution thread, so implementations relay the increment to the
//!   I/O side rather than touching the connection directly.
//! - Increments are additive: each call grants `increment` more bytes on
//!   top of whatever was granted before.

use std::io;

/// Relays absorbable capacity back toward the producer.
pub trait CapacityChannel: Send + Sync {
    /// Grant the producer `increment` more bytes.
    fn update(&self, increment: usize) -> io::Result<()>;
}

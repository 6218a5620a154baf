//! # nio-entity: backpressure bridge for blocking body consumers
//!
//! Lets blocking application code read a streamed message body while the
//! I/O threads that receive it never block.
//!
//! ```text
//!  reactor thread                       executor thread
//!  ──────────────                       ───────────────
//!  consumer.stream_start(ct, cb) ──▶ FixedPool ──▶ ClassicEntityConsumer
//!  consumer.consume(chunk)   ─┐                     │ Read::read (blocks)
//!  consumer.stream_end(..)   ─┼──▶ SharedInputBuffer ◀┘
//!  consumer.update_capacity ◀─┘    (freed space → CapacityChannel)
//!                                               cb(result), exactly once
//! ```
//!
//! ## Modules
//!
//! - `shared_buffer`: bounded buffer, the only synchronization point
//! - `input_stream`: `Read` adapter over the buffer
//! - `consumer`: IDLE/ACTIVE/COMPLETED state machine
//! - `future`: one-shot callback/future pair
//! - `pool`: fixed thread pool `Executor`
//! - `basic`: bytes and string consumers
//!
//! ## Quick Start
//!
//! ```ignore
//! use nio_entity::{result_channel, AsyncEntityConsumer, EntityConsumer, FixedPool, StringConsumer};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(FixedPool::auto_sized(256)?);
//! let consumer = EntityConsumer::new(64 * 1024, pool, StringConsumer::new())?;
//!
//! let (callback, future) = result_channel();
//! consumer.stream_start(Some("text/plain; charset=UTF-8"), callback)?;
//! consumer.consume(b"hello")?;
//! consumer.stream_end(&[])?;
//! assert_eq!(future.wait()?, "hello");
//! ```

pub mod shared_buffer;
pub mod input_stream;
pub mod consumer;
pub mod future;
pub mod pool;
pub mod basic;

pub use shared_buffer::SharedInputBuffer;
pub use input_stream::ContentInputStream;
pub use consumer::{AsyncEntityConsumer, ClassicEntityConsumer, ConsumerState, EntityConsumer};
pub use future::{result_channel, ResultCallback, ResultFuture};
pub use pool::FixedPool;
pub use basic::{BytesConsumer, StringConsumer};

pub use nio_core::{CapacityChannel, EntityError, EntityResult, Executor, PoolError};

//! # nio-reactor: fixed pool of selector reactors
//!
//! Multiplexes many network channels over a fixed number of
//! single-threaded event loops, one OS thread each.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Acceptor thread                                         │
//! │   pool.add_channel(ChannelEntry::new(stream))            │
//! └──────────────────┬───────────────────────────────────────┘
//!                    │ round-robin, cursor++ mod N
//! ┌──────────────────▼───────────────────────────────────────┐
//! │  MultiWorkerReactor                                      │
//! │   SelectorReactor[i] ◀── bound 1:1 ──▶ worker thread[i]   │
//! │   mio::Poll → IoEventDispatch callbacks (never block)    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use nio_reactor::{MultiWorkerReactor, ReactorConfig, ChannelEntry};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut pool = MultiWorkerReactor::new(ReactorConfig::from_env())?;
//! pool.start_workers(Arc::new(MyDispatch))?;
//!
//! for stream in listener.incoming() {
//!     let stream = stream?;
//!     stream.set_nonblocking(true)?;
//!     pool.add_channel(ChannelEntry::new(mio::net::TcpStream::from_std(stream)));
//! }
//!
//! pool.stop_workers(Duration::from_secs(5))?;
//! pool.verify_workers()?;
//! ```

pub mod config;
pub mod dispatch;
pub mod session;
pub mod selector;
pub mod multiworker;
mod worker;

pub use config::ReactorConfig;
pub use dispatch::IoEventDispatch;
pub use session::{ChannelEntry, IoSession};
pub use selector::SelectorReactor;
pub use multiworker::MultiWorkerReactor;

pub use nio_core::{ReactorError, ReactorResult, ReactorStatus};

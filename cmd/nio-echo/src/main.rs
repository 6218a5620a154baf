//! nio Echo Server
//!
//! TCP echo server on a `MultiWorkerReactor`. The main thread accepts
//! connections and hands them to the pool round-robin; each worker
//! echoes bytes back from its own event loop.
//!
//! Usage:
//!     cargo build --release -p nio-echo
//!     ./target/release/nio-echo [port] [seconds]
//!
//! `seconds` bounds the run (default: until killed). Worker count and
//! select timeout come from `NIO_WORKER_COUNT` / `NIO_SELECT_TIMEOUT_MS`.
//!
//! Test with:
//!     echo "hello" | nc localhost 9999

use nio_core::{ReactorError, ReactorResult};
use nio_reactor::{ChannelEntry, IoEventDispatch, IoSession, MultiWorkerReactor, ReactorConfig};

use mio::net::TcpStream;
use mio::Interest;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const BUF_SIZE: usize = 4096;

/// Bytes read but not yet written back.
#[derive(Default)]
struct Pending(Vec<u8>);

struct Echo;

impl Echo {
    /// Write out what is pending. Returns `false` if the peer is gone.
    fn flush(session: &mut IoSession<TcpStream>) -> bool {
        let mut pending = match session.take_attachment() {
            Some(boxed) => match boxed.downcast::<Pending>() {
                Ok(p) => *p,
                Err(_) => Pending::default(),
            },
            None => Pending::default(),
        };

        let mut written = 0;
        let alive = loop {
            if written == pending.0.len() {
                break true;
            }
            match session.channel_mut().write(&pending.0[written..]) {
                Ok(0) => break false,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break false,
            }
        };
        pending.0.drain(..written);

        let interest = if pending.0.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        session.set_interest(interest);
        session.set_attachment(pending);
        alive
    }
}

impl IoEventDispatch<TcpStream> for Echo {
    fn connected(&self, session: &mut IoSession<TcpStream>) -> ReactorResult<()> {
        debug!(token = session.token().0, "connected");
        session.set_attachment(Pending::default());
        Ok(())
    }

    fn input_ready(&self, session: &mut IoSession<TcpStream>) -> ReactorResult<()> {
        let mut buf = [0u8; BUF_SIZE];
        loop {
            match session.channel_mut().read(&mut buf) {
                Ok(0) => {
                    session.close();
                    return Ok(());
                }
                Ok(n) => {
                    if let Some(pending) = session.attachment_mut::<Pending>() {
                        pending.0.extend_from_slice(&buf[..n]);
                    }
                    if !Self::flush(session) {
                        session.close();
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(token = session.token().0, error = %e, "read failed");
                    session.close();
                    return Ok(());
                }
            }
        }
    }

    fn output_ready(&self, session: &mut IoSession<TcpStream>) -> ReactorResult<()> {
        if !Self::flush(session) {
            session.close();
        }
        Ok(())
    }

    fn disconnected(&self, session: &mut IoSession<TcpStream>) {
        debug!(token = session.token().0, "disconnected");
    }
}

fn main() -> Result<(), ReactorError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(9999);
    let run_for: Option<Duration> = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs);

    let config = ReactorConfig::from_env();
    let mut pool: MultiWorkerReactor<TcpStream> = MultiWorkerReactor::new(config)?;
    pool.start_workers(Arc::new(Echo))?;

    let listener = TcpListener::bind(("0.0.0.0", port))?;
    listener.set_nonblocking(true)?;
    info!(port, workers = pool.worker_count(), "nio-echo listening");

    let started = Instant::now();
    let mut accepted: u64 = 0;
    loop {
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(true)?;
                let worker = pool.add_channel(ChannelEntry::new(TcpStream::from_std(stream)));
                accepted += 1;
                debug!(%peer, worker, "accepted");
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // Surface crashed workers while idle
                if let Err(e) = pool.verify_workers() {
                    warn!(error = %e, "worker failure, stopping");
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }

    info!(accepted, "shutting down");
    pool.stop_workers(Duration::from_secs(5))?;
    pool.verify_workers()
}

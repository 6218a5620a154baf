//! # Selector reactor: one single-threaded event loop
//!
//! A `SelectorReactor` owns a `mio::Poll` and every session registered
//! with it. The loop runs on exactly one thread (the worker that calls
//! `execute()`); other threads only talk to it through two doors:
//!
//! - `add_channel()` pushes onto a lock-free queue and wakes the selector.
//! - `shutdown()` flips the status and wakes the selector.
//!
//! ```text
//!  acceptor ──add_channel──▶ SegQueue ─┐
//!                                      ▼
//!  stopper ──shutdown──▶ Waker ──▶ poll(select_timeout) ──▶ dispatch
//! ```

use crate::dispatch::IoEventDispatch;
use crate::session::{ChannelEntry, IoSession};

use nio_core::{ReactorError, ReactorResult, ReactorStatus};

use crossbeam_queue::SegQueue;
use mio::event::Source;
use mio::net::TcpStream;
use mio::{Events, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Reserved token for the cross-thread waker.
const WAKE_TOKEN: Token = Token(usize::MAX);

/// Single-threaded event loop over a set of registered channels.
pub struct SelectorReactor<C = TcpStream> {
    id: usize,
    select_timeout: Duration,
    event_capacity: usize,
    /// Taken by the thread that runs `execute()`.
    poll: Mutex<Option<Poll>>,
    waker: Waker,
    /// Channels assigned but not yet registered with the selector.
    new_channels: SegQueue<ChannelEntry<C>>,
    status: AtomicU8,
}

impl<C> SelectorReactor<C> {
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn status(&self) -> ReactorStatus {
        ReactorStatus::from(self.status.load(Ordering::Acquire))
    }

    /// Channels queued for registration that the loop has not picked up yet.
    pub fn pending_channels(&self) -> usize {
        self.new_channels.len()
    }

    /// Queue a channel for registration. Safe to call from any thread.
    ///
    /// A reactor whose loop has already exited drops the channel.
    pub fn add_channel(&self, entry: ChannelEntry<C>) {
        if self.status() == ReactorStatus::ShutDown {
            warn!(reactor = self.id, "reactor is shut down, dropping channel");
            return;
        }
        self.new_channels.push(entry);
        if let Err(e) = self.waker.wake() {
            warn!(reactor = self.id, error = %e, "failed to wake selector for new channel");
        }
        // Lost the race with the loop's final drain
        if self.status() == ReactorStatus::ShutDown {
            self.discard_pending();
        }
    }

    /// Request the loop to stop. Idempotent; safe to call from any thread.
    pub fn shutdown(&self) -> ReactorResult<()> {
        let prev = ReactorStatus::from(
            self.status
                .fetch_max(ReactorStatus::ShuttingDown.into(), Ordering::AcqRel),
        );
        if prev.is_shutting_down() {
            return Ok(());
        }
        debug!(reactor = self.id, "shutdown requested");
        self.waker.wake()?;
        Ok(())
    }

    fn discard_pending(&self) {
        let mut dropped = 0usize;
        while self.new_channels.pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(reactor = self.id, dropped, "discarded unregistered channels");
        }
    }
}

impl<C: Source + Send + 'static> SelectorReactor<C> {
    /// Create a reactor with its own selector.
    pub fn new(id: usize, select_timeout: Duration, event_capacity: usize) -> ReactorResult<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;
        Ok(Self {
            id,
            select_timeout,
            event_capacity,
            poll: Mutex::new(Some(poll)),
            waker,
            new_channels: SegQueue::new(),
            status: AtomicU8::new(ReactorStatus::Inactive.into()),
        })
    }

    /// Run the event loop on the calling thread until shutdown or failure.
    ///
    /// Can only be called once per reactor. Every session still open when
    /// the loop exits is closed and reported through `disconnected`.
    pub fn execute(&self, dispatch: &dyn IoEventDispatch<C>) -> ReactorResult<()> {
        let mut poll = self
            .poll
            .lock()
            .take()
            .ok_or(ReactorError::AlreadyExecuted(self.id))?;

        if self
            .status
            .compare_exchange(
                ReactorStatus::Inactive.into(),
                ReactorStatus::Active.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // Shut down before the loop ever started
            self.discard_pending();
            self.status.store(ReactorStatus::ShutDown.into(), Ordering::Release);
            return Ok(());
        }

        info!(reactor = self.id, "I/O reactor started");

        let mut sessions: HashMap<Token, IoSession<C>> = HashMap::new();
        let result = self.event_loop(&mut poll, &mut sessions, dispatch);

        let registry = poll.registry();
        for (_, mut session) in sessions.drain() {
            if let Err(e) = registry.deregister(session.channel_mut()) {
                debug!(reactor = self.id, error = %e, "deregister on shutdown failed");
            }
            session.close();
            dispatch.disconnected(&mut session);
        }
        self.discard_pending();
        self.status.store(ReactorStatus::ShutDown.into(), Ordering::Release);

        match &result {
            Ok(()) => info!(reactor = self.id, "I/O reactor stopped"),
            Err(e) => warn!(reactor = self.id, error = %e, "I/O reactor terminated"),
        }
        result
    }

    fn event_loop(
        &self,
        poll: &mut Poll,
        sessions: &mut HashMap<Token, IoSession<C>>,
        dispatch: &dyn IoEventDispatch<C>,
    ) -> ReactorResult<()> {
        let mut events = Events::with_capacity(self.event_capacity);
        let mut next_token = 0usize;

        loop {
            match poll.poll(&mut events, Some(self.select_timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            if self.status().is_shutting_down() {
                return Ok(());
            }

            let registry = poll.registry();

            for event in events.iter() {
                let token = event.token();
                if token == WAKE_TOKEN {
                    continue;
                }
                let Some(session) = sessions.get_mut(&token) else {
                    continue;
                };

                if event.is_readable() || event.is_read_closed() || event.is_error() {
                    dispatch.input_ready(session)?;
                }
                if event.is_writable() && !session.is_closed() {
                    dispatch.output_ready(session)?;
                }
                if !self.settle(registry, session, dispatch)? {
                    sessions.remove(&token);
                }
            }

            while let Some(entry) = self.new_channels.pop() {
                let token = Token(next_token);
                next_token = next_token.wrapping_add(1) % WAKE_TOKEN.0;

                let mut session = entry.into_session(token);
                let interest = session.interest();
                if let Err(e) = registry.register(session.channel_mut(), token, interest) {
                    warn!(reactor = self.id, error = %e, "channel registration failed, dropping");
                    continue;
                }
                debug!(reactor = self.id, token = token.0, "channel registered");

                let settled = dispatch
                    .connected(&mut session)
                    .and_then(|()| self.settle(registry, &mut session, dispatch));
                match settled {
                    Ok(true) => {
                        sessions.insert(token, session);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.abandon(registry, &mut session, dispatch);
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Apply what the handler asked for during a callback.
    /// Returns `false` once the session is gone.
    fn settle(
        &self,
        registry: &Registry,
        session: &mut IoSession<C>,
        dispatch: &dyn IoEventDispatch<C>,
    ) -> ReactorResult<bool> {
        if session.is_closed() {
            if let Err(e) = registry.deregister(session.channel_mut()) {
                debug!(reactor = self.id, error = %e, "deregister failed");
            }
            dispatch.disconnected(session);
            return Ok(false);
        }
        if let Some(interest) = session.take_interest_change() {
            let token = session.token();
            registry.reregister(session.channel_mut(), token, interest)?;
        }
        Ok(true)
    }

    /// Deregister and report a session that never made it into the loop.
    fn abandon(
        &self,
        registry: &Registry,
        session: &mut IoSession<C>,
        dispatch: &dyn IoEventDispatch<C>,
    ) {
        if let Err(e) = registry.deregister(session.channel_mut()) {
            debug!(reactor = self.id, error = %e, "deregister failed");
        }
        session.close();
        dispatch.disconnected(session);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    /// A channel that accepts registration but never becomes ready.
    pub(crate) struct NullChannel;

    impl Source for NullChannel {
        fn register(&mut self, _: &Registry, _: Token, _: mio::Interest) -> io::Result<()> {
            Ok(())
        }
        fn reregister(&mut self, _: &Registry, _: Token, _: mio::Interest) -> io::Result<()> {
            Ok(())
        }
        fn deregister(&mut self, _: &Registry) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counting {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl IoEventDispatch<NullChannel> for Counting {
        fn connected(&self, _session: &mut IoSession<NullChannel>) -> ReactorResult<()> {
            self.connected.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn input_ready(&self, _session: &mut IoSession<NullChannel>) -> ReactorResult<()> {
            Ok(())
        }
        fn disconnected(&self, _session: &mut IoSession<NullChannel>) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_register_and_shutdown_closes_sessions() {
        let reactor = Arc::new(
            SelectorReactor::<NullChannel>::new(0, Duration::from_millis(50), 16).unwrap(),
        );
        let dispatch = Arc::new(Counting::default());

        let r = Arc::clone(&reactor);
        let d = Arc::clone(&dispatch);
        let handle = thread::spawn(move || r.execute(&*d));

        reactor.add_channel(ChannelEntry::new(NullChannel));
        reactor.add_channel(ChannelEntry::new(NullChannel));
        assert!(wait_for(|| dispatch.connected.load(Ordering::SeqCst) == 2));
        assert_eq!(reactor.status(), ReactorStatus::Active);

        reactor.shutdown().unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(reactor.status(), ReactorStatus::ShutDown);
        assert_eq!(dispatch.disconnected.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_execute_only_once() {
        let reactor = SelectorReactor::<NullChannel>::new(3, Duration::from_millis(10), 16).unwrap();
        reactor.shutdown().unwrap();
        let dispatch = Counting::default();
        assert!(reactor.execute(&dispatch).is_ok());
        assert!(matches!(
            reactor.execute(&dispatch),
            Err(ReactorError::AlreadyExecuted(3))
        ));
    }

    #[test]
    fn test_shutdown_before_execute_discards_pending() {
        let reactor = SelectorReactor::<NullChannel>::new(0, Duration::from_millis(10), 16).unwrap();
        reactor.add_channel(ChannelEntry::new(NullChannel));
        assert_eq!(reactor.pending_channels(), 1);

        reactor.shutdown().unwrap();
        reactor.shutdown().unwrap();
        let dispatch = Counting::default();
        reactor.execute(&dispatch).unwrap();

        assert_eq!(reactor.pending_channels(), 0);
        assert_eq!(dispatch.connected.load(Ordering::SeqCst), 0);
        assert_eq!(reactor.status(), ReactorStatus::ShutDown);
    }

    struct CloseOnConnect;

    impl IoEventDispatch<NullChannel> for CloseOnConnect {
        fn connected(&self, session: &mut IoSession<NullChannel>) -> ReactorResult<()> {
            session.close();
            Ok(())
        }
        fn input_ready(&self, _session: &mut IoSession<NullChannel>) -> ReactorResult<()> {
            Ok(())
        }
        fn disconnected(&self, session: &mut IoSession<NullChannel>) {
            if let Some(flag) = session.attachment::<Arc<AtomicUsize>>() {
                flag.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_handler_close_reports_disconnect() {
        let reactor = Arc::new(
            SelectorReactor::<NullChannel>::new(0, Duration::from_millis(50), 16).unwrap(),
        );
        let closed = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&reactor);
        let handle = thread::spawn(move || r.execute(&CloseOnConnect));

        reactor.add_channel(ChannelEntry::with_attachment(NullChannel, Arc::clone(&closed)));
        assert!(wait_for(|| closed.load(Ordering::SeqCst) == 1));

        reactor.shutdown().unwrap();
        handle.join().unwrap().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    /// Fails every connect, counting disconnect reports.
    #[derive(Default)]
    struct FailOnConnect {
        disconnected: AtomicUsize,
    }

    impl IoEventDispatch<NullChannel> for FailOnConnect {
        fn connected(&self, _session: &mut IoSession<NullChannel>) -> ReactorResult<()> {
            Err(ReactorError::Dispatch("connect refused".into()))
        }
        fn input_ready(&self, _session: &mut IoSession<NullChannel>) -> ReactorResult<()> {
            Ok(())
        }
        fn disconnected(&self, session: &mut IoSession<NullChannel>) {
            assert!(session.is_closed());
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_connect_failure_reports_disconnect() {
        let reactor = SelectorReactor::<NullChannel>::new(0, Duration::from_millis(10), 16).unwrap();
        reactor.add_channel(ChannelEntry::new(NullChannel));
        let dispatch = FailOnConnect::default();

        match reactor.execute(&dispatch) {
            Err(ReactorError::Dispatch(msg)) => assert_eq!(msg, "connect refused"),
            other => panic!("expected dispatch failure, got {:?}", other),
        }
        assert_eq!(dispatch.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(reactor.status(), ReactorStatus::ShutDown);
    }

    #[test]
    fn test_add_channel_after_exit_is_dropped() {
        let reactor = SelectorReactor::<NullChannel>::new(0, Duration::from_millis(10), 16).unwrap();
        reactor.shutdown().unwrap();
        reactor.execute(&Counting::default()).unwrap();
        assert_eq!(reactor.status(), ReactorStatus::ShutDown);

        for _ in 0..3 {
            reactor.add_channel(ChannelEntry::new(NullChannel));
        }
        assert_eq!(reactor.pending_channels(), 0);
    }
}

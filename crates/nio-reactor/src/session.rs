//! Channel registrations and the per-channel session a reactor owns.

use mio::{Interest, Token};
use std::any::Any;

/// A channel handed to the pool, plus an optional opaque attachment.
///
/// Ownership moves to whichever reactor the entry is assigned to.
pub struct ChannelEntry<C> {
    channel: C,
    attachment: Option<Box<dyn Any + Send>>,
}

impl<C> ChannelEntry<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            attachment: None,
        }
    }

    pub fn with_attachment<A: Any + Send>(channel: C, attachment: A) -> Self {
        Self {
            channel,
            attachment: Some(Box::new(attachment)),
        }
    }

    pub(crate) fn into_session(self, token: Token) -> IoSession<C> {
        IoSession {
            token,
            channel: self.channel,
            attachment: self.attachment,
            interest: Interest::READABLE,
            interest_changed: false,
            closed: false,
        }
    }
}

/// A registered channel as seen by the event dispatch handler.
///
/// Only ever touched by the reactor thread that owns it.
pub struct IoSession<C> {
    token: Token,
    channel: C,
    attachment: Option<Box<dyn Any + Send>>,
    interest: Interest,
    interest_changed: bool,
    closed: bool,
}

impl<C> IoSession<C> {
    /// Selector token, unique within the owning reactor.
    #[inline]
    pub fn token(&self) -> Token {
        self.token
    }

    #[inline]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    #[inline]
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Attachment downcast to `A`, if present and of that type.
    pub fn attachment<A: Any>(&self) -> Option<&A> {
        self.attachment.as_ref().and_then(|a| a.downcast_ref())
    }

    pub fn attachment_mut<A: Any>(&mut self) -> Option<&mut A> {
        self.attachment.as_mut().and_then(|a| a.downcast_mut())
    }

    pub fn set_attachment<A: Any + Send>(&mut self, attachment: A) {
        self.attachment = Some(Box::new(attachment));
    }

    pub fn take_attachment(&mut self) -> Option<Box<dyn Any + Send>> {
        self.attachment.take()
    }

    #[inline]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Change the readiness interest. Applied after the current
    /// dispatch callback returns.
    pub fn set_interest(&mut self, interest: Interest) {
        if interest != self.interest {
            self.interest = interest;
            self.interest_changed = true;
        }
    }

    /// Request the session be closed. The reactor deregisters the channel
    /// and reports `disconnected` after the current callback returns.
    pub fn close(&mut self) {
        self.closed = true;
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn take_interest_change(&mut self) -> Option<Interest> {
        if std::mem::take(&mut self.interest_changed) {
            Some(self.interest)
        } else {
            None
        }
    }
}

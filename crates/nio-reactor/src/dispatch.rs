//! Event dispatch seam between a reactor and the protocol layer.
//!
//! **Contract:**
//! - Callbacks run on the reactor thread and must NEVER block it.
//!   Blocking work belongs on an executor (see `nio-entity`).
//! - One handler instance is shared by every worker in a pool, so it
//!   must be `Send + Sync`; per-connection state lives in the session
//!   attachment.
//! - Returning `Err` is a reactor-level failure: the owning reactor's
//!   loop terminates and the cause is recorded for `verify_workers()`.
//!   Per-connection problems should be handled by calling
//!   `session.close()` instead.

use crate::session::IoSession;
use nio_core::ReactorResult;

/// Receives readiness events for sessions owned by a reactor.
pub trait IoEventDispatch<C>: Send + Sync {
    /// A new channel has been registered with the reactor.
    fn connected(&self, _session: &mut IoSession<C>) -> ReactorResult<()> {
        Ok(())
    }

    /// The channel is readable (or the peer closed its write side).
    fn input_ready(&self, session: &mut IoSession<C>) -> ReactorResult<()>;

    /// The channel is writable.
    fn output_ready(&self, _session: &mut IoSession<C>) -> ReactorResult<()> {
        Ok(())
    }

    /// The session has been closed and deregistered.
    fn disconnected(&self, _session: &mut IoSession<C>) {}
}

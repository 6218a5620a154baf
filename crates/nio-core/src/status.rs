//! Reactor lifecycle status

use core::fmt;

/// Lifecycle status of a selector reactor or a reactor pool.
///
/// Ordered: a reactor only ever moves forward through these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReactorStatus {
    /// Constructed, event loop not running yet
    Inactive = 0,

    /// Event loop running
    Active = 1,

    /// Shutdown requested, loop winding down
    ShuttingDown = 2,

    /// Loop exited, all sessions closed
    ShutDown = 3,
}

impl ReactorStatus {
    /// Check if shutdown has been requested or completed
    #[inline]
    pub const fn is_shutting_down(&self) -> bool {
        matches!(self, ReactorStatus::ShuttingDown | ReactorStatus::ShutDown)
    }
}

impl From<u8> for ReactorStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => ReactorStatus::Inactive,
            1 => ReactorStatus::Active,
            2 => ReactorStatus::ShuttingDown,
            _ => ReactorStatus::ShutDown,
        }
    }
}

impl From<ReactorStatus> for u8 {
    fn from(status: ReactorStatus) -> u8 {
        status as u8
    }
}

impl fmt::Display for ReactorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorStatus::Inactive => write!(f, "INACTIVE"),
            ReactorStatus::Active => write!(f, "ACTIVE"),
            ReactorStatus::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            ReactorStatus::ShutDown => write!(f, "SHUT_DOWN"),
        }
    }
}

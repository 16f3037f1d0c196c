//! Queue lifecycle state

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a batch queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting items
    Running,
    /// Rejecting items, final drain in progress
    Stopping,
    /// Drained and released
    Stopped,
}

impl QueueState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Stopping => 1,
            Self::Stopped => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

/// Atomic holder for [`QueueState`]
///
/// Uses SeqCst throughout: producers and drain sweeps pair a counter
/// increment with a state read, and shutdown pairs the state write with
/// counter reads.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(QueueState::Running.as_u8()))
    }

    #[inline]
    pub(crate) fn load(&self) -> QueueState {
        QueueState::from_u8(self.0.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.load() == QueueState::Running
    }

    /// Move from `from` to `to`; false if the state was not `from`
    pub(crate) fn transition(&self, from: QueueState, to: QueueState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn store(&self, state: QueueState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

//! Kernel error type.

use core::fmt;

use crate::thread::ThreadId;

/// Errors reported by kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// The thread is already a member of some queue.
    AlreadyLinked(ThreadId),
    /// The thread has terminated and can never be queued again.
    Terminated(ThreadId),
    /// No thread was created in this slot.
    UnknownThread(ThreadId),
    /// Every application slot of the thread table is in use.
    ThreadTableFull,
    /// The stack region is smaller than the port requires.
    StackTooSmall { required: usize, provided: usize },
    /// Threads can only be created before the kernel starts.
    AlreadyStarted,
    /// The operation needs a running thread but the kernel has not started.
    NotStarted,
    /// The idle thread must never wait on a queue.
    IdleCannotBlock,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyLinked(id) => write!(f, "thread {} is already queued", id),
            Self::Terminated(id) => write!(f, "thread {} has terminated", id),
            Self::UnknownThread(id) => write!(f, "no thread in slot {}", id),
            Self::ThreadTableFull => write!(f, "thread table is full"),
            Self::StackTooSmall { required, provided } => write!(
                f,
                "stack of {} bytes is below the {} byte minimum",
                provided, required
            ),
            Self::AlreadyStarted => write!(f, "kernel already started"),
            Self::NotStarted => write!(f, "kernel not started"),
            Self::IdleCannotBlock => write!(f, "idle thread cannot block"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KernelError {}

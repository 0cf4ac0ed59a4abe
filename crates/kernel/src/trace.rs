//! Scheduler trace events.
//!
//! A [`TraceHook`] installed through [`KernelConfig`](crate::KernelConfig)
//! sees every scheduling decision. Hooks run inside the kernel's critical
//! section with the kernel state borrowed, so they must be short and must
//! not call back into the kernel.

use crate::thread::ThreadId;

/// One scheduler event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TraceEvent {
    /// A thread slot was filled.
    Created(ThreadId),
    /// Dispatch selected `to` while `from` was current.
    Scheduled { from: Option<ThreadId>, to: ThreadId },
    /// The ready queue was empty; the idle thread was selected.
    Idle,
    /// A thread parked itself on a wait queue.
    Blocked(ThreadId),
    /// A waiter was moved back to the ready queue.
    Woken(ThreadId),
    /// A thread's entry function returned.
    Terminated(ThreadId),
}

/// Receiver for [`TraceEvent`]s.
pub type TraceHook = &'static (dyn Fn(TraceEvent) + Sync);

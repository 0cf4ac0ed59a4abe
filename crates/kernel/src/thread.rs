//! Threads: identifiers, status, control blocks and the first-run trampoline.
//!
//! A thread owns a fixed stack region handed to the kernel at creation and
//! runs `entry(arg)` exactly once. Threads live in a static table and are
//! addressed by [`ThreadId`], the slot index.

use core::fmt;

use crate::config::MAX_THREADS;
use crate::kernel::Kernel;
use crate::port::Port;

/// Thread identifier: index of the thread's slot in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadId(pub u8);

impl ThreadId {
    /// The idle thread occupies the slot after the application slots.
    pub const IDLE: ThreadId = ThreadId(MAX_THREADS as u8);

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_idle() {
            write!(f, "idle")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Thread execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThreadStatus {
    /// Thread is waiting on the ready queue.
    Ready,
    /// Thread is currently executing.
    Running,
    /// Thread is parked on a wait queue.
    Blocked,
    /// Thread's entry function has returned.
    Terminated,
}

/// Thread entry function. Returning terminates the thread.
pub type ThreadEntry = fn(u32);

/// Location of a thread's stack region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stack {
    pub base: usize,
    pub size: usize,
}

impl Stack {
    pub(crate) fn of(region: &[u8]) -> Self {
        Self {
            base: region.as_ptr() as usize,
            size: region.len(),
        }
    }
}

/// Intrusive queue links. `queued` is the membership flag; `prev`/`next`
/// are only meaningful while it is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) prev: Option<ThreadId>,
    pub(crate) next: Option<ThreadId>,
    pub(crate) queued: bool,
}

/// Thread control block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tcb {
    /// `None` for the idle thread, whose body lives in the kernel.
    pub(crate) entry: Option<ThreadEntry>,
    pub(crate) arg: u32,
    pub(crate) status: ThreadStatus,
    pub(crate) links: Links,
    pub(crate) stack: Stack,
}

impl Tcb {
    pub(crate) fn new(entry: Option<ThreadEntry>, arg: u32, stack: Stack) -> Self {
        Self {
            entry,
            arg,
            status: ThreadStatus::Ready,
            links: Links::default(),
            stack,
        }
    }
}

/// First-run bootstrap of a thread.
///
/// A port stores the trampoline in a fresh thread's initial context and
/// calls [`Trampoline::run`] the first time that context is restored. The
/// trampoline re-enables interrupts, runs the entry function and, when it
/// returns, marks the thread `Terminated` and dispatches away for good.
///
/// The kernel reference is type-erased so that a port's context type does
/// not have to name the kernel it belongs to.
#[derive(Clone, Copy)]
pub struct Trampoline {
    kernel: *const (),
    thread: ThreadId,
    enter: unsafe fn(*const (), ThreadId) -> !,
}

// SAFETY: the erased pointer always refers to a `&'static Kernel<P>`, which
// is `Sync`.
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

impl Trampoline {
    pub(crate) fn new<P: Port>(kernel: &'static Kernel<P>, thread: ThreadId) -> Self {
        Self {
            kernel: kernel as *const Kernel<P> as *const (),
            thread,
            enter: enter::<P>,
        }
    }

    /// Thread this trampoline starts.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Starts the thread.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, on the thread's own execution context,
    /// with the CPU lock held (as it is right after a context switch).
    pub unsafe fn run(self) -> ! {
        unsafe { (self.enter)(self.kernel, self.thread) }
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("thread", &self.thread)
            .finish_non_exhaustive()
    }
}

unsafe fn enter<P: Port>(kernel: *const (), thread: ThreadId) -> ! {
    // SAFETY: created from a `&'static Kernel<P>` in `Trampoline::new`.
    let kernel: &'static Kernel<P> = unsafe { &*(kernel as *const Kernel<P>) };
    kernel.run_thread(thread)
}

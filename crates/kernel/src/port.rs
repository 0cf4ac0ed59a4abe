//! Execution-context boundary.
//!
//! The kernel never touches CPU registers, stack frames or interrupt enable
//! bits itself. A [`Port`] supplies those for one target: how a fresh
//! thread's saved context is laid out, how one context is suspended and
//! another resumed, how interrupts are masked and how the periodic tick is
//! armed.

use crate::kernel::Kernel;
use crate::thread::Trampoline;

/// Target-specific half of the kernel.
///
/// # Safety
///
/// Implementations must honour the contracts documented on each method;
/// the kernel's memory safety relies on `switch_context` and the CPU lock
/// behaving exactly as described.
pub unsafe trait Port: Sized + Sync + 'static {
    /// Saved execution state of one thread.
    type Context: Send;

    /// Smallest stack region accepted by [`Port::init_context`].
    const MIN_STACK_SIZE: usize;

    /// Builds the initial context of a fresh thread.
    ///
    /// Restoring the returned context for the first time must call
    /// [`Trampoline::run`] on the thread's own stack with the CPU lock still
    /// held.
    fn init_context(&self, stack: &'static mut [u8], trampoline: Trampoline) -> Self::Context;

    /// Suspends the caller, saving its state into `old`, and resumes `new`.
    ///
    /// Returns only once some later switch resumes `old`.
    ///
    /// # Safety
    ///
    /// Called with the CPU lock held. Both pointers refer to contexts owned
    /// by the kernel that stay valid for the duration of the call; `old`
    /// belongs to the calling thread.
    unsafe fn switch_context(&self, old: *mut Self::Context, new: *mut Self::Context);

    /// Abandons the calling execution context and starts `first`.
    ///
    /// # Safety
    ///
    /// Called once, from [`Kernel::start`], with the CPU lock held.
    unsafe fn restore_first(&self, first: *mut Self::Context) -> !;

    /// Masks interrupt delivery.
    ///
    /// # Safety
    ///
    /// Must be paired with [`Port::leave_cpu_lock`]; not reentrant.
    unsafe fn enter_cpu_lock(&self);

    /// Unmasks interrupt delivery; pending interrupts are taken now.
    ///
    /// # Safety
    ///
    /// Only valid while the lock is held.
    unsafe fn leave_cpu_lock(&self);

    /// Whether interrupt delivery is masked for the calling context.
    fn is_cpu_lock_active(&self) -> bool;

    /// Arms the periodic tick; `handler` must be fired from the tick
    /// interrupt every `period_us` microseconds.
    fn start_tick(&self, period_us: u32, handler: TickHandler);

    /// Body of the idle thread's loop. Runs with interrupts enabled; a
    /// hardware port would typically sleep until the next interrupt.
    fn idle(&self) {
        core::hint::spin_loop();
    }
}

/// Entry point the tick interrupt calls into.
#[derive(Clone, Copy)]
pub struct TickHandler {
    kernel: *const (),
    tick: unsafe fn(*const ()),
}

// SAFETY: the erased pointer always refers to a `&'static Kernel<P>`.
unsafe impl Send for TickHandler {}
unsafe impl Sync for TickHandler {}

impl TickHandler {
    pub(crate) fn new<P: Port>(kernel: &'static Kernel<P>) -> Self {
        Self {
            kernel: kernel as *const Kernel<P> as *const (),
            tick: tick::<P>,
        }
    }

    /// Runs the kernel's tick handler. Call from interrupt context.
    pub fn fire(&self) {
        // SAFETY: `kernel` was created from a `&'static Kernel<P>` matching
        // the monomorphized `tick`.
        unsafe { (self.tick)(self.kernel) }
    }
}

unsafe fn tick<P: Port>(kernel: *const ()) {
    let kernel: &'static Kernel<P> = unsafe { &*(kernel as *const Kernel<P>) };
    kernel.on_tick();
}

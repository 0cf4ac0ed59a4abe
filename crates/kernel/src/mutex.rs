//! Blocking mutex with direct hand-off.
//!
//! `unlock` passes ownership straight to the longest waiting thread, so a
//! thread returning from a contended `lock` already owns the mutex and
//! never has to compete for it again. Waiters are served in FIFO order.
//! There is no priority inheritance and no recursion: locking a mutex the
//! caller already owns blocks forever.

use core::cell::RefCell;

use critical_section::Mutex as CsMutex;

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::port::Port;
use crate::queue::ThreadQueue;
use crate::thread::ThreadId;

#[derive(Debug, Default)]
struct MutexState {
    owner: Option<ThreadId>,
    waiters: ThreadQueue,
}

/// Binary lock owned by at most one thread.
pub struct Mutex<P: Port> {
    kernel: &'static Kernel<P>,
    state: CsMutex<RefCell<MutexState>>,
}

impl<P: Port> Mutex<P> {
    /// An unowned mutex with no waiters.
    pub const fn new(kernel: &'static Kernel<P>) -> Self {
        Self {
            kernel,
            state: CsMutex::new(RefCell::new(MutexState {
                owner: None,
                waiters: ThreadQueue::new(),
            })),
        }
    }

    /// Acquires the mutex, blocking while another thread owns it.
    pub fn lock(&self) -> Result<(), KernelError> {
        let kernel = self.kernel;
        kernel.with_cpu_lock(|cs| {
            {
                let mut state = self.state.borrow_ref_mut(cs);
                let me = kernel.current(cs).ok_or(KernelError::NotStarted)?;
                if state.owner.is_none() {
                    state.owner = Some(me);
                    return Ok(());
                }
                kernel.block_current(cs, &mut state.waiters)?;
            }
            // `unlock` makes us the owner before we are resumed.
            kernel.dispatch(cs);
            Ok(())
        })
    }

    /// Releases the mutex, handing it to the first waiter if there is one.
    ///
    /// Unlocking a mutex the caller does not own is silently ignored.
    pub fn unlock(&self) -> Result<(), KernelError> {
        let kernel = self.kernel;
        kernel.with_cpu_lock(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let me = kernel.current(cs).ok_or(KernelError::NotStarted)?;
            if state.owner != Some(me) {
                return Ok(());
            }
            let next = kernel.wake_one(cs, &mut state.waiters);
            state.owner = next;
            Ok(())
        })
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.kernel.with_cpu_lock(|cs| self.state.borrow_ref(cs).owner)
    }

    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// Number of threads blocked in [`Mutex::lock`].
    pub fn waiters(&self) -> usize {
        self.kernel.with_cpu_lock(|cs| self.state.borrow_ref(cs).waiters.len())
    }
}

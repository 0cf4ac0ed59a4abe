//! The simulated processor: who runs, whether interrupts are masked and
//! which interrupt lines are pending.
//!
//! Every kernel thread is backed by a host thread ("worker"). Only the
//! worker whose token equals `running` executes; the others wait on the
//! condition variable. Host threads that are not workers (test drivers, the
//! boot thread) may also take the CPU lock, which stops the simulated
//! processor from entering a critical section until they release it.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

/// Number of interrupt lines. Lower numbers are delivered first.
pub const NUM_LINES: u32 = 8;

pub(crate) type Handler = Arc<dyn Fn() + Send + Sync>;

thread_local! {
    static WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling host thread backs a kernel thread.
pub(crate) fn is_worker() -> bool {
    WORKER.with(Cell::get)
}

pub(crate) fn mark_worker() {
    WORKER.with(|worker| worker.set(true));
}

/// Holder of the CPU lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mask {
    /// The simulated processor: whichever worker currently runs.
    Processor,
    /// A host thread outside the kernel.
    Host(thread::ThreadId),
}

#[derive(Debug)]
struct Cpu {
    running: u64,
    mask: Option<Mask>,
    pending: u32,
    enabled: u32,
}

pub(crate) struct Processor {
    cpu: Mutex<Cpu>,
    changed: Condvar,
    handlers: Mutex<[Option<Handler>; NUM_LINES as usize]>,
    next_token: AtomicU64,
}

impl Processor {
    pub(crate) fn new() -> Self {
        Self {
            cpu: Mutex::new(Cpu {
                running: 0,
                mask: None,
                pending: 0,
                enabled: 0,
            }),
            changed: Condvar::new(),
            handlers: Mutex::new(Default::default()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Fresh identity for a kernel thread's context.
    pub(crate) fn new_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Lets the worker with `token` run.
    pub(crate) fn hand_off(&self, token: u64) {
        self.cpu.lock().running = token;
        self.changed.notify_all();
    }

    /// Blocks the calling worker until it holds the processor.
    pub(crate) fn wait_for_baton(&self, token: u64) {
        let mut cpu = self.cpu.lock();
        while cpu.running != token {
            self.changed.wait(&mut cpu);
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        match self.cpu.lock().mask {
            None => false,
            Some(Mask::Processor) => is_worker(),
            Some(Mask::Host(id)) => id == thread::current().id(),
        }
    }

    pub(crate) fn lock(&self) {
        let owner = if is_worker() {
            Mask::Processor
        } else {
            Mask::Host(thread::current().id())
        };
        let mut cpu = self.cpu.lock();
        while cpu.mask.is_some() {
            self.changed.wait(&mut cpu);
        }
        cpu.mask = Some(owner);
    }

    pub(crate) fn unlock(&self) {
        self.cpu.lock().mask = None;
        self.changed.notify_all();
        if is_worker() {
            self.deliver_pending();
        }
    }

    /// Hands a lock taken by the boot thread over to the processor.
    pub(crate) fn lock_for_processor(&self) {
        self.cpu.lock().mask = Some(Mask::Processor);
    }

    /// Runs handlers for pending, enabled lines until none are left.
    ///
    /// Each handler runs with the CPU lock held by the processor, exactly
    /// like a hardware interrupt. A handler may switch contexts; it then
    /// finishes when some later switch resumes this worker.
    pub(crate) fn deliver_pending(&self) {
        loop {
            let line = {
                let mut cpu = self.cpu.lock();
                while cpu.mask.is_some() {
                    self.changed.wait(&mut cpu);
                }
                let ready = cpu.pending & cpu.enabled;
                if ready == 0 {
                    return;
                }
                let line = ready.trailing_zeros();
                cpu.pending &= !(1 << line);
                cpu.mask = Some(Mask::Processor);
                line
            };

            let handler = self.handlers.lock()[line as usize].clone();
            match handler {
                Some(handler) => handler(),
                None => log::warn!("interrupt line {} has no handler", line),
            }

            self.cpu.lock().mask = None;
            self.changed.notify_all();
        }
    }

    /// Sleeps until an enabled line is pending.
    pub(crate) fn wait_for_interrupt(&self) {
        let mut cpu = self.cpu.lock();
        while cpu.pending & cpu.enabled == 0 {
            self.changed.wait(&mut cpu);
        }
    }

    pub(crate) fn attach(&self, line: u32, handler: Handler) {
        self.handlers.lock()[line as usize] = Some(handler);
    }

    pub(crate) fn pend(&self, line: u32) {
        self.cpu.lock().pending |= 1 << line;
        self.changed.notify_all();
    }

    pub(crate) fn clear(&self, line: u32) {
        self.cpu.lock().pending &= !(1 << line);
    }

    pub(crate) fn is_pending(&self, line: u32) -> bool {
        self.cpu.lock().pending & (1 << line) != 0
    }

    pub(crate) fn set_enabled(&self, line: u32, enabled: bool) {
        let mut cpu = self.cpu.lock();
        if enabled {
            cpu.enabled |= 1 << line;
        } else {
            cpu.enabled &= !(1 << line);
        }
        drop(cpu);
        self.changed.notify_all();
    }
}

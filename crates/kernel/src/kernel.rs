//! Scheduler and kernel state.
//!
//! All mutable kernel state sits in one `critical_section::Mutex<RefCell<_>>`
//! and is only borrowed inside [`Kernel::with_cpu_lock`]. Borrows never
//! span a context switch: dispatch picks the next thread, drops the borrow
//! and only then hands the two saved contexts to the port.

use core::cell::{RefCell, UnsafeCell};

use critical_section::{CriticalSection, Mutex as CsMutex};

use crate::config::{KernelConfig, IDLE_STACK_SIZE};
use crate::error::KernelError;
use crate::port::{Port, TickHandler};
use crate::queue::{ThreadQueue, ThreadTable, SLOTS};
use crate::thread::{Stack, Tcb, ThreadEntry, ThreadId, ThreadStatus, Trampoline};
use crate::trace::TraceEvent;

pub(crate) struct State<P: Port> {
    pub(crate) table: ThreadTable,
    contexts: [Option<P::Context>; SLOTS],
    pub(crate) ready: ThreadQueue,
    pub(crate) current: Option<ThreadId>,
    started: bool,
}

/// The kernel: thread table, ready queue and the port it runs on.
///
/// A kernel is used through a `&'static` reference once threads exist,
/// either from a `static` (`Kernel::new` is `const`) or a leaked box on
/// hosted targets.
pub struct Kernel<P: Port> {
    port: P,
    config: KernelConfig,
    pub(crate) state: CsMutex<RefCell<State<P>>>,
    idle_stack: UnsafeCell<[u8; IDLE_STACK_SIZE]>,
}

// SAFETY: `state` is only reached through a critical-section token and the
// idle stack is handed to the port once, under the CPU lock.
unsafe impl<P: Port> Sync for Kernel<P> {}

impl<P: Port> Kernel<P> {
    pub const fn new(port: P, config: KernelConfig) -> Self {
        Self {
            port,
            config,
            state: CsMutex::new(RefCell::new(State {
                table: ThreadTable::new(),
                contexts: [const { None }; SLOTS],
                ready: ThreadQueue::new(),
                current: None,
                started: false,
            })),
            idle_stack: UnsafeCell::new([0; IDLE_STACK_SIZE]),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Runs `f` with interrupt delivery masked.
    ///
    /// Nests: when the calling context already holds the CPU lock (an
    /// interrupt handler, or an outer `with_cpu_lock`) the lock is neither
    /// re-entered nor released.
    pub fn with_cpu_lock<R>(&self, f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
        if self.port.is_cpu_lock_active() {
            // SAFETY: interrupts are already masked for this context.
            return f(unsafe { CriticalSection::new() });
        }
        // SAFETY: paired with the `leave_cpu_lock` below.
        unsafe { self.port.enter_cpu_lock() };
        let result = f(unsafe { CriticalSection::new() });
        unsafe { self.port.leave_cpu_lock() };
        result
    }

    fn trace(&self, event: TraceEvent) {
        if let Some(hook) = self.config.trace_hook() {
            hook(event);
        }
    }

    /// Creates a thread that will run `entry(arg)` on `stack`.
    ///
    /// The thread starts `Ready` but is not queued; pass its id to
    /// [`Kernel::enqueue_ready`] to make it eligible. Only allowed before
    /// [`Kernel::start`].
    pub fn create_thread(
        &'static self,
        stack: &'static mut [u8],
        entry: ThreadEntry,
        arg: u32,
    ) -> Result<ThreadId, KernelError> {
        if stack.len() < P::MIN_STACK_SIZE {
            return Err(KernelError::StackTooSmall {
                required: P::MIN_STACK_SIZE,
                provided: stack.len(),
            });
        }
        self.with_cpu_lock(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.started {
                return Err(KernelError::AlreadyStarted);
            }
            let id = state.table.allocate(Tcb::new(Some(entry), arg, Stack::of(stack)))?;
            state.contexts[id.index()] = Some(self.port.init_context(stack, Trampoline::new(self, id)));
            log::debug!("created thread {} (arg {})", id, arg);
            self.trace(TraceEvent::Created(id));
            Ok(id)
        })
    }

    /// Appends a thread to the ready queue.
    pub fn enqueue_ready(&self, id: ThreadId) -> Result<(), KernelError> {
        self.with_cpu_lock(|cs| {
            let state = &mut *self.state.borrow_ref_mut(cs);
            state.table.enqueue(&mut state.ready, id)
        })
    }

    /// Removes the head of the ready queue.
    pub fn dequeue_ready(&self) -> Option<ThreadId> {
        self.with_cpu_lock(|cs| {
            let state = &mut *self.state.borrow_ref_mut(cs);
            state.table.dequeue(&mut state.ready)
        })
    }

    /// Appends a thread to an arbitrary queue, typically a wait queue.
    pub fn enqueue(&self, cs: CriticalSection<'_>, queue: &mut ThreadQueue, id: ThreadId) -> Result<(), KernelError> {
        self.state.borrow_ref_mut(cs).table.enqueue(queue, id)
    }

    /// Removes the head of an arbitrary queue.
    pub fn dequeue(&self, cs: CriticalSection<'_>, queue: &mut ThreadQueue) -> Option<ThreadId> {
        self.state.borrow_ref_mut(cs).table.dequeue(queue)
    }

    /// The running thread, `None` before [`Kernel::start`].
    pub fn current(&self, cs: CriticalSection<'_>) -> Option<ThreadId> {
        self.state.borrow_ref(cs).current
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.with_cpu_lock(|cs| self.current(cs))
    }

    pub fn status(&self, id: ThreadId) -> Option<ThreadStatus> {
        self.with_cpu_lock(|cs| self.state.borrow_ref(cs).table.get(id).map(|tcb| tcb.status))
    }

    pub fn stack(&self, id: ThreadId) -> Option<Stack> {
        self.with_cpu_lock(|cs| self.state.borrow_ref(cs).table.get(id).map(|tcb| tcb.stack))
    }

    /// Number of threads waiting on the ready queue.
    pub fn ready_len(&self) -> usize {
        self.with_cpu_lock(|cs| self.state.borrow_ref(cs).ready.len())
    }

    pub fn is_started(&self) -> bool {
        self.with_cpu_lock(|cs| self.state.borrow_ref(cs).started)
    }

    /// Starts scheduling. Never returns.
    ///
    /// # Panics
    ///
    /// Panics if the kernel was already started.
    pub fn start(&'static self) -> ! {
        // SAFETY: released by the first thread's trampoline.
        unsafe { self.port.enter_cpu_lock() };
        let cs = unsafe { CriticalSection::new() };
        let first = self.boot(cs);
        let context = self.context_ptr(cs, first);
        log::debug!("starting with thread {}", first);
        unsafe { self.port.restore_first(context) }
    }

    /// Selects the first thread and arms the tick. Everything `start` does
    /// short of leaving the boot context.
    pub(crate) fn boot(&'static self, cs: CriticalSection<'_>) -> ThreadId {
        let first = {
            let state = &mut *self.state.borrow_ref_mut(cs);
            assert!(!state.started, "kernel started twice");
            state.started = true;
            let first = self.select(state);
            state.current = Some(first);
            self.trace(TraceEvent::Scheduled { from: None, to: first });
            first
        };
        self.port
            .start_tick(self.config.tick_period_us(), TickHandler::new(self));
        first
    }

    /// Yields the processor to the next ready thread.
    pub fn yield_now(&'static self) {
        self.with_cpu_lock(|cs| self.dispatch(cs));
    }

    /// Tick interrupt body: preempts the running thread.
    pub fn on_tick(&'static self) {
        self.with_cpu_lock(|cs| self.dispatch(cs));
    }

    /// Rotates the running thread to the tail of the ready queue (if it is
    /// still `Running`) and switches to the head. Falls back to the idle
    /// thread when nothing is ready.
    pub fn dispatch(&'static self, cs: CriticalSection<'_>) {
        let switch = {
            let state = &mut *self.state.borrow_ref_mut(cs);
            let Some(old) = state.current else {
                return;
            };
            if let Some(tcb) = state.table.get_mut(old) {
                if tcb.status == ThreadStatus::Running {
                    tcb.status = ThreadStatus::Ready;
                    // The idle thread never waits on the ready queue. A
                    // thread the application already re-queued with
                    // `enqueue_ready` keeps its place.
                    if !old.is_idle() {
                        if let Err(err) = state.table.enqueue(&mut state.ready, old) {
                            log::trace!("not re-queueing {}: {}", old, err);
                        }
                    }
                }
            }
            let new = self.select(state);
            state.current = Some(new);
            if new == old {
                None
            } else {
                self.trace(TraceEvent::Scheduled { from: Some(old), to: new });
                Some((old, new))
            }
        };

        if let Some((old, new)) = switch {
            log::trace!("dispatch {} -> {}", old, new);
            let old = self.context_ptr(cs, old);
            let new = self.context_ptr(cs, new);
            // SAFETY: CPU lock held, both contexts are populated slots of
            // `state` and no borrow of `state` is live.
            unsafe { self.port.switch_context(old, new) };
        }
    }

    /// Dequeues the next thread (or the idle thread) and marks it running.
    fn select(&'static self, state: &mut State<P>) -> ThreadId {
        let next = match state.table.dequeue(&mut state.ready) {
            Some(id) => id,
            None => {
                self.trace(TraceEvent::Idle);
                self.idle_thread(state)
            }
        };
        if let Some(tcb) = state.table.get_mut(next) {
            tcb.status = ThreadStatus::Running;
        }
        next
    }

    /// The idle thread, created the first time it is needed.
    fn idle_thread(&'static self, state: &mut State<P>) -> ThreadId {
        let id = ThreadId::IDLE;
        if state.table.get(id).is_none() {
            debug_assert!(IDLE_STACK_SIZE >= P::MIN_STACK_SIZE);
            // SAFETY: the slot is empty, so the stack has not been handed
            // out yet; we hold the CPU lock.
            let stack: &'static mut [u8] = unsafe { &mut *self.idle_stack.get() };
            state.table.install_idle(Tcb::new(None, 0, Stack::of(stack)));
            state.contexts[id.index()] = Some(self.port.init_context(stack, Trampoline::new(self, id)));
            log::debug!("created idle thread");
            self.trace(TraceEvent::Created(id));
        }
        id
    }

    fn context_ptr(&self, cs: CriticalSection<'_>, id: ThreadId) -> *mut P::Context {
        let state = self.state.borrow(cs).as_ptr();
        // SAFETY: the caller holds no borrow of `state`; the pointer is only
        // used by the port while the CPU lock is held.
        match unsafe { &mut (*state).contexts[id.index()] } {
            Some(context) => context as *mut P::Context,
            None => unreachable!("thread {} has no context", id),
        }
    }

    /// Parks the running thread on `queue` and marks it `Blocked`.
    ///
    /// The caller must release its own borrows and then call
    /// [`Kernel::dispatch`] within the same critical section.
    pub fn block_current(&self, cs: CriticalSection<'_>, queue: &mut ThreadQueue) -> Result<ThreadId, KernelError> {
        let mut state = self.state.borrow_ref_mut(cs);
        let me = state.current.ok_or(KernelError::NotStarted)?;
        if me.is_idle() {
            return Err(KernelError::IdleCannotBlock);
        }
        state.table.enqueue(queue, me)?;
        if let Some(tcb) = state.table.get_mut(me) {
            tcb.status = ThreadStatus::Blocked;
        }
        self.trace(TraceEvent::Blocked(me));
        Ok(me)
    }

    /// Moves the head of `queue`, if any, to the ready queue.
    pub fn wake_one(&self, cs: CriticalSection<'_>, queue: &mut ThreadQueue) -> Option<ThreadId> {
        let state = &mut *self.state.borrow_ref_mut(cs);
        let id = state.table.dequeue(queue)?;
        if let Some(tcb) = state.table.get_mut(id) {
            tcb.status = ThreadStatus::Ready;
        }
        let requeued = state.table.enqueue(&mut state.ready, id);
        debug_assert!(requeued.is_ok());
        self.trace(TraceEvent::Woken(id));
        Some(id)
    }

    /// Marks the running thread `Terminated`. It is never queued again.
    pub(crate) fn terminate_current(&self, cs: CriticalSection<'_>) {
        let mut state = self.state.borrow_ref_mut(cs);
        if let Some(id) = state.current {
            if let Some(tcb) = state.table.get_mut(id) {
                tcb.status = ThreadStatus::Terminated;
            }
            log::debug!("thread {} terminated", id);
            self.trace(TraceEvent::Terminated(id));
        }
    }

    /// Body of every thread, entered through its [`Trampoline`].
    pub(crate) fn run_thread(&'static self, id: ThreadId) -> ! {
        // SAFETY: the switch that resumed this context left the lock held.
        unsafe { self.port.leave_cpu_lock() };

        if id.is_idle() {
            loop {
                self.port.idle();
            }
        }

        let body = self.with_cpu_lock(|cs| {
            let state = self.state.borrow_ref(cs);
            state.table.get(id).and_then(|tcb| tcb.entry.map(|entry| (entry, tcb.arg)))
        });
        if let Some((entry, arg)) = body {
            entry(arg);
        }

        self.with_cpu_lock(|cs| {
            self.terminate_current(cs);
            self.dispatch(cs);
        });
        unreachable!("terminated thread {} was resumed", id)
    }
}

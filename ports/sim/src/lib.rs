//! Host simulation port for the ukern kernel.
//!
//! Runs a ukern kernel inside an ordinary process so that the scheduler,
//! the mutex and the serial driver can be exercised by tests and demos:
//!
//! - each kernel thread is backed by a host thread, started lazily the first
//!   time the kernel switches to it; exactly one of them runs at a time;
//! - interrupts are numbered lines with host-side handlers, delivered on the
//!   running kernel thread whenever it unmasks interrupts or idles;
//! - [`SimTimer`] pends [`TICK_LINE`] from a host timer thread;
//! - [`SimUart`] models a UART on [`UART_RX_LINE`] and [`UART_TX_LINE`].
//!
//! Interrupts are only taken at those delivery points. A kernel thread that
//! spins without ever calling into the kernel is therefore never preempted.

mod processor;
mod timer;
mod uart;

use std::sync::Arc;
use std::thread;

use hal::interrupt::{InterruptController, InterruptPriority};
use hal::timer::{Timer, TimerMode};
use hal::{HalError, HalResult};
use parking_lot::Mutex;
use ukern::{Port, TickHandler, Trampoline};

use processor::{is_worker, mark_worker, Processor};
pub use processor::NUM_LINES;
pub use timer::SimTimer;
pub use uart::SimUart;

/// Scheduler tick.
pub const TICK_LINE: u32 = 0;
/// UART "data received".
pub const UART_RX_LINE: u32 = 1;
/// UART "transmit register empty".
pub const UART_TX_LINE: u32 = 2;

/// Saved context of one simulated thread.
pub struct SimContext {
    token: u64,
    first_run: Option<Trampoline>,
}

/// [`Port`] implementation for hosted targets.
pub struct SimPort {
    processor: Arc<Processor>,
    timer: Mutex<SimTimer>,
}

impl SimPort {
    pub fn new() -> Self {
        let processor = Arc::new(Processor::new());
        let timer = SimTimer::new(Arc::clone(&processor), TICK_LINE);
        Self {
            processor,
            timer: Mutex::new(timer),
        }
    }

    /// The UART wired to [`UART_RX_LINE`] and [`UART_TX_LINE`].
    pub fn uart(&self) -> SimUart {
        SimUart::new(Arc::clone(&self.processor))
    }

    /// Installs `handler` for `line` and enables the line.
    pub fn attach(&self, line: u32, handler: impl Fn() + Send + Sync + 'static) -> HalResult<()> {
        check_line(line)?;
        self.processor.attach(line, Arc::new(handler));
        self.processor.set_enabled(line, true);
        Ok(())
    }

    /// Ticks delivered by the tick timer so far.
    pub fn ticks(&self) -> u64 {
        self.timer.lock().counter()
    }

    /// Stops the tick timer.
    pub fn stop_tick(&self) {
        let _ = self.timer.lock().stop();
    }

    fn resume(&self, context: &mut SimContext) {
        if let Some(trampoline) = context.first_run.take() {
            self.spawn_worker(context.token, trampoline);
        }
        self.processor.hand_off(context.token);
    }

    fn spawn_worker(&self, token: u64, trampoline: Trampoline) {
        let processor = Arc::clone(&self.processor);
        thread::Builder::new()
            .name(format!("ukern-{}", trampoline.thread()))
            .spawn(move || {
                mark_worker();
                processor.wait_for_baton(token);
                log::trace!("thread {} starts", trampoline.thread());
                // SAFETY: first and only run, on the thread's own worker, and
                // the switch that resumed us left the CPU lock held.
                unsafe { trampoline.run() }
            })
            .expect("failed to spawn a worker thread");
    }
}

impl Default for SimPort {
    fn default() -> Self {
        Self::new()
    }
}

fn check_line(line: u32) -> HalResult<()> {
    if line < NUM_LINES {
        Ok(())
    } else {
        Err(HalError::InvalidInterrupt(line))
    }
}

unsafe impl Port for SimPort {
    type Context = SimContext;

    const MIN_STACK_SIZE: usize = 64;

    fn init_context(&self, _stack: &'static mut [u8], trampoline: Trampoline) -> SimContext {
        // The worker runs on its own host stack; the region is only recorded
        // by the kernel.
        SimContext {
            token: self.processor.new_token(),
            first_run: Some(trampoline),
        }
    }

    unsafe fn switch_context(&self, old: *mut SimContext, new: *mut SimContext) {
        assert!(is_worker(), "context switch requested outside of a kernel thread");
        let old = unsafe { (*old).token };
        self.resume(unsafe { &mut *new });
        self.processor.wait_for_baton(old);
    }

    unsafe fn restore_first(&self, first: *mut SimContext) -> ! {
        self.processor.lock_for_processor();
        self.resume(unsafe { &mut *first });
        loop {
            thread::park();
        }
    }

    unsafe fn enter_cpu_lock(&self) {
        self.processor.lock();
    }

    unsafe fn leave_cpu_lock(&self) {
        self.processor.unlock();
    }

    fn is_cpu_lock_active(&self) -> bool {
        self.processor.is_locked()
    }

    fn start_tick(&self, period_us: u32, handler: TickHandler) {
        if let Err(err) = self.attach(TICK_LINE, move || handler.fire()) {
            log::error!("cannot attach tick handler: {}", err);
            return;
        }
        let mut timer = self.timer.lock();
        if let Err(err) = timer.start(u64::from(period_us), TimerMode::Periodic) {
            log::error!("cannot start tick timer: {}", err);
        }
    }

    fn idle(&self) {
        self.processor.wait_for_interrupt();
        self.processor.deliver_pending();
    }
}

impl InterruptController for SimPort {
    fn enable_interrupt(&self, irq_num: u32) -> HalResult<()> {
        check_line(irq_num)?;
        self.processor.set_enabled(irq_num, true);
        Ok(())
    }

    fn disable_interrupt(&self, irq_num: u32) -> HalResult<()> {
        check_line(irq_num)?;
        self.processor.set_enabled(irq_num, false);
        Ok(())
    }

    fn set_priority(&self, irq_num: u32, _priority: InterruptPriority) -> HalResult<()> {
        check_line(irq_num)?;
        // Priorities are fixed by line number.
        Err(HalError::NotSupported)
    }

    fn is_pending(&self, irq_num: u32) -> bool {
        irq_num < NUM_LINES && self.processor.is_pending(irq_num)
    }

    fn pend(&self, irq_num: u32) -> HalResult<()> {
        check_line(irq_num)?;
        self.processor.pend(irq_num);
        Ok(())
    }

    fn clear_pending(&self, irq_num: u32) -> HalResult<()> {
        check_line(irq_num)?;
        self.processor.clear(irq_num);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_lines_are_rejected() {
        let port = SimPort::new();
        assert_eq!(port.attach(NUM_LINES, || {}), Err(HalError::InvalidInterrupt(NUM_LINES)));
        assert_eq!(port.pend(99), Err(HalError::InvalidInterrupt(99)));
        assert!(!port.is_pending(99));
    }

    #[test]
    fn host_threads_are_not_workers() {
        let port = SimPort::new();
        assert!(!port.is_cpu_lock_active());
        unsafe { port.enter_cpu_lock() };
        assert!(port.is_cpu_lock_active());
        unsafe { port.leave_cpu_lock() };
        assert!(!port.is_cpu_lock_active());
    }

    #[test]
    fn controller_masks_and_clears_lines() {
        let port = SimPort::new();
        port.attach(UART_RX_LINE, || {}).unwrap();

        port.pend(UART_RX_LINE).unwrap();
        port.disable_interrupt(UART_RX_LINE).unwrap();
        port.processor.deliver_pending();
        assert!(port.is_pending(UART_RX_LINE));

        port.enable_interrupt(UART_RX_LINE).unwrap();
        port.processor.deliver_pending();
        assert!(!port.is_pending(UART_RX_LINE));

        port.pend(UART_TX_LINE).unwrap();
        port.clear_pending(UART_TX_LINE).unwrap();
        assert!(!port.is_pending(UART_TX_LINE));

        assert_eq!(port.set_priority(UART_RX_LINE, 0), Err(HalError::NotSupported));
        assert_eq!(port.enable_interrupt(NUM_LINES), Err(HalError::InvalidInterrupt(NUM_LINES)));
    }
}


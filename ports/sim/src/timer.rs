//! Host-thread timer that pends an interrupt line on every expiration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hal::timer::{Timer, TimerMode};
use hal::{HalError, HalResult};

use crate::processor::Processor;

pub struct SimTimer {
    processor: Arc<Processor>,
    line: u32,
    expirations: Arc<AtomicU64>,
    stop: Option<Arc<AtomicBool>>,
}

impl SimTimer {
    pub(crate) fn new(processor: Arc<Processor>, line: u32) -> Self {
        Self {
            processor,
            line,
            expirations: Arc::new(AtomicU64::new(0)),
            stop: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }
}

impl Timer for SimTimer {
    fn start(&mut self, period_us: u64, mode: TimerMode) -> HalResult<()> {
        if period_us == 0 {
            return Err(HalError::InvalidParameter);
        }
        self.stop()?;

        let stop = Arc::new(AtomicBool::new(false));
        let processor = Arc::clone(&self.processor);
        let expirations = Arc::clone(&self.expirations);
        let line = self.line;
        let period = Duration::from_micros(period_us);
        let stopped = Arc::clone(&stop);
        thread::Builder::new()
            .name("ukern-timer".into())
            .spawn(move || loop {
                thread::sleep(period);
                if stopped.load(Ordering::Relaxed) {
                    break;
                }
                expirations.fetch_add(1, Ordering::Relaxed);
                processor.pend(line);
                if mode == TimerMode::OneShot {
                    break;
                }
            })
            .map_err(|err| {
                log::error!("cannot spawn timer thread: {}", err);
                HalError::Busy
            })?;

        self.stop = Some(stop);
        Ok(())
    }

    fn stop(&mut self) -> HalResult<()> {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    fn counter(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    fn enable_interrupt(&mut self) -> HalResult<()> {
        self.processor.set_enabled(self.line, true);
        Ok(())
    }

    fn disable_interrupt(&mut self) -> HalResult<()> {
        self.processor.set_enabled(self.line, false);
        Ok(())
    }

    fn clear_interrupt(&mut self) -> HalResult<()> {
        self.processor.clear(self.line);
        Ok(())
    }
}

impl Drop for SimTimer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

//! Timer abstraction

use crate::error::HalResult;

/// Timer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    OneShot,
    Periodic,
}

/// Timer trait
pub trait Timer: Send + Sync {
    /// Start timer with specified period in microseconds
    fn start(&mut self, period_us: u64, mode: TimerMode) -> HalResult<()>;

    /// Stop timer
    fn stop(&mut self) -> HalResult<()>;

    /// Number of expirations since the timer was started
    fn counter(&self) -> u64;

    /// Enable interrupt on timeout
    fn enable_interrupt(&mut self) -> HalResult<()>;

    /// Disable interrupt
    fn disable_interrupt(&mut self) -> HalResult<()>;

    /// Clear interrupt flag
    fn clear_interrupt(&mut self) -> HalResult<()>;
}

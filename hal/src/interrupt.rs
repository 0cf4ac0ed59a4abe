//! Interrupt controller abstraction

use crate::error::HalResult;

/// Interrupt priority (0 = highest on most platforms)
pub type InterruptPriority = u8;

/// Interrupt controller abstraction
///
/// Controllers are memory-mapped and shared with interrupt handlers, so the
/// methods take `&self`.
pub trait InterruptController: Send + Sync {
    /// Enable interrupt
    fn enable_interrupt(&self, irq_num: u32) -> HalResult<()>;

    /// Disable interrupt
    fn disable_interrupt(&self, irq_num: u32) -> HalResult<()>;

    /// Set interrupt priority
    fn set_priority(&self, irq_num: u32, priority: InterruptPriority) -> HalResult<()>;

    /// Check if interrupt is pending
    fn is_pending(&self, irq_num: u32) -> bool;

    /// Mark interrupt pending (software trigger)
    fn pend(&self, irq_num: u32) -> HalResult<()>;

    /// Clear pending interrupt
    fn clear_pending(&self, irq_num: u32) -> HalResult<()>;
}

//! Kernel configuration.

use core::fmt;

use crate::trace::TraceHook;

/// Number of application thread slots in the thread table.
pub const MAX_THREADS: usize = 16;

/// Size of the statically allocated idle thread stack, in bytes.
pub const IDLE_STACK_SIZE: usize = 256;

/// Default tick period: 2 ms.
pub const DEFAULT_TICK_PERIOD_US: u32 = 2_000;

/// Kernel configuration.
///
/// `KernelConfig::new()` is `const` so a kernel can live in a `static`;
/// tests and hosted code usually go through [`KernelConfig::builder`].
#[derive(Clone, Copy)]
pub struct KernelConfig {
    tick_period_us: u32,
    trace: Option<TraceHook>,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            tick_period_us: DEFAULT_TICK_PERIOD_US,
            trace: None,
        }
    }

    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::new()
    }

    /// Period of the preemption tick in microseconds.
    pub fn tick_period_us(&self) -> u32 {
        self.tick_period_us
    }

    pub fn trace_hook(&self) -> Option<TraceHook> {
        self.trace
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("tick_period_us", &self.tick_period_us)
            .field("trace", &self.trace.is_some())
            .finish()
    }
}

/// Builder for [`KernelConfig`].
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: KernelConfig::new(),
        }
    }

    /// Sets the tick period. A period of zero is clamped to 1 µs.
    pub fn tick_period_us(mut self, period_us: u32) -> Self {
        self.config.tick_period_us = period_us.max(1);
        self
    }

    /// Installs a hook that receives every scheduler [`TraceEvent`](crate::TraceEvent).
    pub fn trace_hook(mut self, hook: TraceHook) -> Self {
        self.config.trace = Some(hook);
        self
    }

    pub fn build(self) -> KernelConfig {
        self.config
    }
}

impl Default for KernelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

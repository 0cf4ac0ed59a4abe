//! Serial driver errors.

use core::fmt;

use hal::HalError;
use ukern::KernelError;

/// Errors reported by the serial driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialError {
    /// Blocking failed; usually the kernel has not been started.
    Kernel(KernelError),
    /// The UART rejected its configuration.
    Hal(HalError),
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kernel(err) => write!(f, "kernel error: {}", err),
            Self::Hal(err) => write!(f, "uart error: {}", err),
        }
    }
}

impl From<KernelError> for SerialError {
    fn from(err: KernelError) -> Self {
        Self::Kernel(err)
    }
}

impl From<HalError> for SerialError {
    fn from(err: HalError) -> Self {
        Self::Hal(err)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SerialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Kernel(err) => Some(err),
            Self::Hal(err) => Some(err),
        }
    }
}

//! Hardware Abstraction Layer (HAL) for the ukern kernel and drivers
//!
//! This crate provides vendor-agnostic traits for the few peripherals the
//! kernel and its serial driver touch: the UART data/interrupt registers, a
//! periodic timer for the scheduler tick and the interrupt controller.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod error;
pub mod interrupt;
pub mod timer;
pub mod uart;

// Re-export commonly used types
pub use error::{HalError, HalResult};

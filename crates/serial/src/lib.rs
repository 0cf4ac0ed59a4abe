//! # ukern-serial - Interrupt-Driven Serial Driver
//!
//! A UART driver built on the ukern scheduler. Bytes travel through two
//! fixed-size ring buffers that the UART interrupt handlers fill and drain.
//! Threads block on a wait queue when the buffer they need is full (TX) or
//! empty (RX) and are woken by the handlers.
//!
//! Two levels of API:
//!
//! - byte level: [`Serial::put_byte`], [`Serial::get_byte`], [`Serial::write`]
//! - message level: [`Serial::write_atomic`], [`Serial::read_atomic`] and
//!   [`Serial::write_fmt_atomic`], which hold a per-direction mutex so that
//!   concurrent messages are never interleaved.
//!
//! The port wires [`Serial::on_rx_interrupt`] and
//! [`Serial::on_tx_empty_interrupt`] to the UART's interrupt vectors.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

mod driver;
pub mod error;
mod truncate;
pub mod ring;

pub use driver::{Serial, DEFAULT_BUFFER_SIZE, FMT_BUFFER_SIZE};
pub use error::SerialError;
pub use ring::RingBuffer;

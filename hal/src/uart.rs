//! UART (Universal Asynchronous Receiver/Transmitter) abstraction
//!
//! The serial driver owns the buffering and blocking logic; a UART
//! implementation only exposes the data register and the two interrupt
//! enables. Every method takes `&self` because the registers are shared
//! between thread context and the UART interrupt handlers.

use crate::error::HalResult;

/// UART data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// UART stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

/// UART parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// UART flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowControl {
    None,
    RtsCts,
}

/// UART configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl UartConfig {
    /// 8N1 framing without flow control at the given baud rate.
    pub const fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::with_baud_rate(115200)
    }
}

/// Register-level UART access used by interrupt-driven drivers.
pub trait UartRegisters: Send + Sync {
    /// Program baud rate and framing, enable receiver and transmitter.
    fn configure(&self, config: &UartConfig) -> HalResult<()>;

    /// Read the receive data register.
    ///
    /// Called from the "data received" interrupt handler; reading
    /// acknowledges the interrupt.
    fn read_data(&self) -> u8;

    /// Write the transmit data register.
    ///
    /// Only called from the "transmit register empty" interrupt handler.
    fn write_data(&self, byte: u8);

    /// Enable or disable the "data received" interrupt.
    fn set_rx_interrupt(&self, enabled: bool);

    /// Enable or disable the "transmit register empty" interrupt.
    fn set_tx_interrupt(&self, enabled: bool);
}

//! Simulated UART.
//!
//! The receive side is fed by host code through [`SimUart::receive`]; the
//! transmit side appends every byte the driver writes to a wire buffer that
//! host code can inspect. The transmitter can be held with
//! [`SimUart::set_tx_ready`] to model a line slower than the producer.

use std::collections::VecDeque;
use std::sync::Arc;

use hal::uart::{FlowControl, UartConfig, UartRegisters};
use hal::{HalError, HalResult};
use parking_lot::Mutex;

use crate::processor::Processor;
use crate::{UART_RX_LINE, UART_TX_LINE};

#[derive(Debug)]
struct UartState {
    config: Option<UartConfig>,
    rx: VecDeque<u8>,
    wire: Vec<u8>,
    rx_irq: bool,
    tx_irq: bool,
    tx_ready: bool,
}

struct Inner {
    processor: Arc<Processor>,
    state: Mutex<UartState>,
}

/// Handle to the simulated UART. Clones share the same device.
#[derive(Clone)]
pub struct SimUart {
    inner: Arc<Inner>,
}

impl SimUart {
    pub(crate) fn new(processor: Arc<Processor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                processor,
                state: Mutex::new(UartState {
                    config: None,
                    rx: VecDeque::new(),
                    wire: Vec::new(),
                    rx_irq: false,
                    tx_irq: false,
                    tx_ready: true,
                }),
            }),
        }
    }

    /// Bytes arriving on the RX pin.
    pub fn receive(&self, bytes: &[u8]) {
        let mut state = self.inner.state.lock();
        state.rx.extend(bytes);
        let raise = state.rx_irq && !state.rx.is_empty();
        drop(state);
        if raise {
            self.inner.processor.pend(UART_RX_LINE);
        }
    }

    /// Everything transmitted so far.
    pub fn transmitted(&self) -> Vec<u8> {
        self.inner.state.lock().wire.clone()
    }

    /// Drains the transmitted bytes.
    pub fn take_transmitted(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.state.lock().wire)
    }

    /// Holds (`false`) or releases (`true`) the transmitter.
    pub fn set_tx_ready(&self, ready: bool) {
        let mut state = self.inner.state.lock();
        state.tx_ready = ready;
        let raise = ready && state.tx_irq;
        drop(state);
        self.update_tx_line(raise);
    }

    pub fn config(&self) -> Option<UartConfig> {
        self.inner.state.lock().config.clone()
    }

    fn update_tx_line(&self, raise: bool) {
        if raise {
            self.inner.processor.pend(UART_TX_LINE);
        } else {
            self.inner.processor.clear(UART_TX_LINE);
        }
    }
}

impl UartRegisters for SimUart {
    fn configure(&self, config: &UartConfig) -> HalResult<()> {
        if config.baud_rate == 0 {
            return Err(HalError::InvalidParameter);
        }
        if config.flow_control == FlowControl::RtsCts {
            return Err(HalError::NotSupported);
        }
        self.inner.state.lock().config = Some(config.clone());
        self.inner.processor.set_enabled(UART_RX_LINE, true);
        self.inner.processor.set_enabled(UART_TX_LINE, true);
        Ok(())
    }

    fn read_data(&self) -> u8 {
        let mut state = self.inner.state.lock();
        let byte = state.rx.pop_front().unwrap_or(0);
        // The receive interrupt stays asserted while data is waiting.
        let raise = state.rx_irq && !state.rx.is_empty();
        drop(state);
        if raise {
            self.inner.processor.pend(UART_RX_LINE);
        }
        byte
    }

    fn write_data(&self, byte: u8) {
        let mut state = self.inner.state.lock();
        state.wire.push(byte);
        let raise = state.tx_irq && state.tx_ready;
        drop(state);
        self.update_tx_line(raise);
    }

    fn set_rx_interrupt(&self, enabled: bool) {
        let mut state = self.inner.state.lock();
        state.rx_irq = enabled;
        let raise = enabled && !state.rx.is_empty();
        drop(state);
        if raise {
            self.inner.processor.pend(UART_RX_LINE);
        } else if !enabled {
            self.inner.processor.clear(UART_RX_LINE);
        }
    }

    fn set_tx_interrupt(&self, enabled: bool) {
        let mut state = self.inner.state.lock();
        state.tx_irq = enabled;
        let raise = enabled && state.tx_ready;
        drop(state);
        self.update_tx_line(raise);
    }
}

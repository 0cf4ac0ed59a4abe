//! Serial driver: ring buffers, wait queues and the two UART handlers.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex as CsMutex;
use hal::uart::{UartConfig, UartRegisters};
use ukern::{Kernel, Mutex, Port, ThreadQueue};

use crate::error::SerialError;
use crate::ring::RingBuffer;
use crate::truncate::Truncating;

/// Default size of each ring buffer (127 usable bytes).
pub const DEFAULT_BUFFER_SIZE: usize = 128;

/// Longest message [`Serial::write_fmt_atomic`] sends; output beyond it is
/// dropped.
pub const FMT_BUFFER_SIZE: usize = 128;

/// One direction: its bytes and the threads waiting on them.
struct Channel<const N: usize> {
    ring: RingBuffer<N>,
    waiters: ThreadQueue,
    dropped: u32,
}

impl<const N: usize> Channel<N> {
    const fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            waiters: ThreadQueue::new(),
            dropped: 0,
        }
    }
}

/// Interrupt-driven UART driver.
///
/// `RX` and `TX` are the ring buffer sizes; each holds one byte less than
/// its size.
pub struct Serial<P: Port, U: UartRegisters, const RX: usize = DEFAULT_BUFFER_SIZE, const TX: usize = DEFAULT_BUFFER_SIZE>
{
    kernel: &'static Kernel<P>,
    uart: U,
    rx: CsMutex<RefCell<Channel<RX>>>,
    tx: CsMutex<RefCell<Channel<TX>>>,
    rx_mutex: Mutex<P>,
    tx_mutex: Mutex<P>,
}

impl<P: Port, U: UartRegisters, const RX: usize, const TX: usize> Serial<P, U, RX, TX> {
    pub const fn new(kernel: &'static Kernel<P>, uart: U) -> Self {
        Self {
            kernel,
            uart,
            rx: CsMutex::new(RefCell::new(Channel::new())),
            tx: CsMutex::new(RefCell::new(Channel::new())),
            rx_mutex: Mutex::new(kernel),
            tx_mutex: Mutex::new(kernel),
        }
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    /// Configures the UART for 8N1 at `baud_rate` and enables reception.
    pub fn init(&self, baud_rate: u32) -> Result<(), SerialError> {
        self.init_with(&UartConfig::with_baud_rate(baud_rate))
    }

    pub fn init_with(&self, config: &UartConfig) -> Result<(), SerialError> {
        self.uart.configure(config)?;
        self.uart.set_rx_interrupt(true);
        log::debug!("serial up at {} baud", config.baud_rate);
        Ok(())
    }

    /// Queues one byte for transmission, blocking while the TX buffer is
    /// full.
    pub fn put_byte(&self, byte: u8) -> Result<(), SerialError> {
        let kernel = self.kernel;
        kernel.with_cpu_lock(|cs| {
            loop {
                {
                    let mut tx = self.tx.borrow_ref_mut(cs);
                    if tx.ring.push(byte).is_ok() {
                        break;
                    }
                    kernel.block_current(cs, &mut tx.waiters)?;
                }
                kernel.dispatch(cs);
            }
            self.uart.set_tx_interrupt(true);
            Ok(())
        })
    }

    /// Takes one received byte, blocking while the RX buffer is empty.
    pub fn get_byte(&self) -> Result<u8, SerialError> {
        let kernel = self.kernel;
        kernel.with_cpu_lock(|cs| loop {
            {
                let mut rx = self.rx.borrow_ref_mut(cs);
                if let Some(byte) = rx.ring.pop() {
                    return Ok(byte);
                }
                kernel.block_current(cs, &mut rx.waiters)?;
            }
            kernel.dispatch(cs);
        })
    }

    /// Writes `bytes` one at a time. Other writers may interleave.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, SerialError> {
        for &byte in bytes {
            self.put_byte(byte)?;
        }
        Ok(bytes.len())
    }

    /// Writes `bytes` as one unit: no other atomic write is interleaved with
    /// it. Returns the number of bytes written.
    pub fn write_atomic(&self, bytes: &[u8]) -> Result<usize, SerialError> {
        if bytes.is_empty() {
            return Ok(0);
        }
        self.tx_mutex.lock()?;
        let sent = self.send(bytes);
        self.tx_mutex.unlock()?;
        sent
    }

    fn send(&self, bytes: &[u8]) -> Result<usize, SerialError> {
        let mut rest = bytes;
        while !rest.is_empty() {
            let free = self.wait_for_tx_space()?;
            let (chunk, tail) = rest.split_at(free.min(rest.len()));
            for &byte in chunk {
                self.put_byte(byte)?;
            }
            rest = tail;
        }
        Ok(bytes.len())
    }

    /// Free TX slots, blocking until there is at least one.
    fn wait_for_tx_space(&self) -> Result<usize, SerialError> {
        let kernel = self.kernel;
        kernel.with_cpu_lock(|cs| loop {
            {
                let mut tx = self.tx.borrow_ref_mut(cs);
                let free = tx.ring.free();
                if free > 0 {
                    return Ok(free);
                }
                kernel.block_current(cs, &mut tx.waiters)?;
            }
            kernel.dispatch(cs);
        })
    }

    /// Fills `dst` completely as one unit: no other atomic read takes bytes
    /// in the meantime. Returns `dst.len()`.
    pub fn read_atomic(&self, dst: &mut [u8]) -> Result<usize, SerialError> {
        if dst.is_empty() {
            return Ok(0);
        }
        self.rx_mutex.lock()?;
        let received = dst
            .iter_mut()
            .try_for_each(|slot| self.get_byte().map(|byte| *slot = byte));
        self.rx_mutex.unlock()?;
        received.map(|()| dst.len())
    }

    /// Formats `args` into a bounded buffer and writes it atomically.
    ///
    /// Output longer than [`FMT_BUFFER_SIZE`] bytes is truncated. Returns
    /// the number of bytes written.
    pub fn write_fmt_atomic(&self, args: fmt::Arguments<'_>) -> Result<usize, SerialError> {
        let mut buf = Truncating::<FMT_BUFFER_SIZE>::new();
        // A failing `Display` impl still leaves its partial output behind.
        let _ = fmt::write(&mut buf, args);
        if buf.truncated() {
            log::debug!("formatted write truncated to {} bytes", FMT_BUFFER_SIZE);
        }
        self.write_atomic(buf.as_bytes())
    }

    /// "Data received" interrupt handler.
    pub fn on_rx_interrupt(&self) {
        let kernel = self.kernel;
        kernel.with_cpu_lock(|cs| {
            let byte = self.uart.read_data();
            let mut rx = self.rx.borrow_ref_mut(cs);
            if rx.ring.push(byte).is_err() {
                rx.dropped = rx.dropped.wrapping_add(1);
                log::warn!("rx buffer full, dropped {:#04x}", byte);
            }
            kernel.wake_one(cs, &mut rx.waiters);
        });
    }

    /// "Transmit register empty" interrupt handler.
    pub fn on_tx_empty_interrupt(&self) {
        let kernel = self.kernel;
        kernel.with_cpu_lock(|cs| {
            let mut tx = self.tx.borrow_ref_mut(cs);
            match tx.ring.pop() {
                Some(byte) => self.uart.write_data(byte),
                None => {
                    self.uart.set_tx_interrupt(false);
                    kernel.wake_one(cs, &mut tx.waiters);
                }
            }
        });
    }

    /// Received bytes lost because the RX buffer was full.
    pub fn dropped_bytes(&self) -> u32 {
        self.kernel.with_cpu_lock(|cs| self.rx.borrow_ref(cs).dropped)
    }

    /// Received bytes waiting to be read.
    pub fn rx_available(&self) -> usize {
        self.kernel.with_cpu_lock(|cs| self.rx.borrow_ref(cs).ring.len())
    }

    /// Bytes queued but not yet handed to the UART.
    pub fn tx_pending(&self) -> usize {
        self.kernel.with_cpu_lock(|cs| self.tx.borrow_ref(cs).ring.len())
    }
}

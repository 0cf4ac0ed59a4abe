//! Serial echo on the host simulation port.
//!
//! Two threads print a line at different rates with atomic writes while a
//! third echoes everything typed on the console. Stdin feeds the simulated
//! RX pin and the TX wire is copied to stdout.
//!
//! ```text
//! cargo run -p echo-demo -- [seconds]
//! ```
//!
//! The demo runs until stdin is closed, then keeps printing for the given
//! number of seconds (default 2).

use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use hal::HalError;
use ukern::{Kernel, KernelConfig, KernelError};
use ukern_port_sim::{SimPort, SimUart, UART_RX_LINE, UART_TX_LINE};
use ukern_serial::{Serial, SerialError};

const STACK_SIZE: usize = 256;
const BAUD_RATE: u32 = 115_200;

type Console = Serial<SimPort, SimUart>;

struct System {
    kernel: &'static Kernel<SimPort>,
    console: &'static Console,
}

static SYSTEM: OnceLock<System> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("serial: {0}")]
    Serial(#[from] SerialError),
    #[error("kernel: {0}")]
    Kernel(#[from] KernelError),
    #[error("interrupt wiring: {0}")]
    Hal(#[from] HalError),
    #[error("console: {0}")]
    Io(#[from] io::Error),
    #[error("invalid duration {0:?}")]
    Duration(String),
    #[error("system already initialised")]
    AlreadyInitialised,
}

fn system() -> &'static System {
    SYSTEM.get().expect("threads only run after the system is built")
}

/// Lets the other threads run until `ms` milliseconds have passed.
fn delay_ms(ms: u64) {
    let kernel = system().kernel;
    let until = Instant::now() + Duration::from_millis(ms);
    while Instant::now() < until {
        kernel.yield_now();
    }
}

fn periodic(message: &[u8], period_ms: u64) {
    let console = system().console;
    loop {
        if let Err(err) = console.write_atomic(message) {
            log::error!("write failed: {}", err);
            return;
        }
        delay_ms(period_ms);
    }
}

fn t1(_: u32) {
    periodic(b"Thread 1\r\n", 200);
}

fn t2(_: u32) {
    periodic(b"Thread 2\r\n", 350);
}

fn echo(_: u32) {
    if let Err(err) = echo_lines(system().console) {
        log::error!("echo stopped: {}", err);
    }
}

fn echo_lines(console: &Console) -> Result<(), SerialError> {
    console.write_atomic(b"Echo thread started. Type something:\r\n")?;
    loop {
        let byte = console.get_byte()?;
        console.put_byte(byte)?;
        if byte == b'\r' {
            console.put_byte(b'\n')?;
        }
    }
}

fn stack() -> &'static mut [u8] {
    Box::leak(vec![0u8; STACK_SIZE].into_boxed_slice())
}

fn build() -> Result<(&'static System, SimUart), DemoError> {
    let kernel: &'static Kernel<SimPort> =
        Box::leak(Box::new(Kernel::new(SimPort::new(), KernelConfig::default())));
    let uart = kernel.port().uart();
    let console: &'static Console = Box::leak(Box::new(Serial::new(kernel, uart.clone())));
    console.init(BAUD_RATE)?;
    kernel.port().attach(UART_RX_LINE, move || console.on_rx_interrupt())?;
    kernel.port().attach(UART_TX_LINE, move || console.on_tx_empty_interrupt())?;

    SYSTEM
        .set(System { kernel, console })
        .map_err(|_| DemoError::AlreadyInitialised)?;

    for entry in [t1 as fn(u32), t2, echo] {
        let id = kernel.create_thread(stack(), entry, 0)?;
        kernel.enqueue_ready(id)?;
    }
    Ok((system(), uart))
}

/// Copies console input to the RX pin, turning newlines into carriage
/// returns the way a serial terminal sends them.
fn feed_stdin(uart: SimUart) -> io::Result<()> {
    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; 64];
    loop {
        let n = stdin.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        for byte in &mut buf[..n] {
            if *byte == b'\n' {
                *byte = b'\r';
            }
        }
        uart.receive(&buf[..n]);
    }
}

fn copy_wire(uart: &SimUart, out: &mut impl Write) -> io::Result<()> {
    let bytes = uart.take_transmitted();
    if !bytes.is_empty() {
        out.write_all(&bytes)?;
        out.flush()?;
    }
    Ok(())
}

fn main() -> Result<(), DemoError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let linger = match std::env::args().nth(1) {
        Some(arg) => arg.parse().map_err(|_| DemoError::Duration(arg))?,
        None => 2,
    };

    let (system, uart) = build()?;
    let kernel = system.kernel;
    thread::Builder::new()
        .name("ukern-boot".into())
        .spawn(move || kernel.start())?;

    let input = {
        let uart = uart.clone();
        thread::Builder::new()
            .name("stdin".into())
            .spawn(move || feed_stdin(uart))?
    };

    let mut stdout = io::stdout();
    let mut deadline = None;
    loop {
        copy_wire(&uart, &mut stdout)?;
        if deadline.is_none() && input.is_finished() {
            deadline = Some(Instant::now() + Duration::from_secs(linger));
        }
        if deadline.is_some_and(|at| Instant::now() >= at) {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    copy_wire(&uart, &mut stdout)?;

    log::info!(
        "{} ticks, {} input bytes dropped",
        kernel.port().ticks(),
        system.console.dropped_bytes()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for_wire(uart: &SimUart, wire: &mut Vec<u8>, done: impl Fn(&str) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            wire.extend(uart.take_transmitted());
            let text = String::from_utf8_lossy(wire);
            if done(&text) {
                return;
            }
            assert!(Instant::now() < deadline, "wire so far: {text:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn periodic_writers_and_echo_share_the_line() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (system, uart) = build().expect("system");
        let kernel = system.kernel;
        thread::spawn(move || kernel.start());

        let mut wire = Vec::new();
        wait_for_wire(&uart, &mut wire, |text| {
            text.contains("Echo thread started")
                && text.matches("Thread 1\r\n").count() >= 2
                && text.contains("Thread 2\r\n")
        });

        uart.receive(b"zq\n");
        wait_for_wire(&uart, &mut wire, |text| text.contains('z') && text.contains('q'));
        assert_eq!(system.console.dropped_bytes(), 0);
    }
}

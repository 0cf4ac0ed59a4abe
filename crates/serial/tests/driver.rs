//! The serial driver wired to the simulated UART and interrupt lines.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use hal::uart::{FlowControl, UartConfig};
use hal::HalError;
use parking_lot::Mutex;
use ukern::{Kernel, KernelConfig, ThreadEntry, ThreadId, ThreadStatus};
use ukern_port_sim::{SimPort, SimUart, UART_RX_LINE, UART_TX_LINE};
use ukern_serial::{Serial, SerialError, FMT_BUFFER_SIZE};

type SimSerial<const TX: usize> = Serial<SimPort, SimUart, 128, TX>;

struct Rig<const TX: usize = 128> {
    kernel: &'static Kernel<SimPort>,
    serial: &'static SimSerial<TX>,
    uart: SimUart,
}

fn rig<const TX: usize>() -> Rig<TX> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = KernelConfig::builder().tick_period_us(1_000).build();
    let kernel: &'static Kernel<SimPort> = Box::leak(Box::new(Kernel::new(SimPort::new(), config)));
    let uart = kernel.port().uart();
    let serial: &'static SimSerial<TX> = Box::leak(Box::new(Serial::new(kernel, uart.clone())));
    serial.init(115_200).expect("8N1 is supported");
    kernel
        .port()
        .attach(UART_RX_LINE, move || serial.on_rx_interrupt())
        .expect("rx line");
    kernel
        .port()
        .attach(UART_TX_LINE, move || serial.on_tx_empty_interrupt())
        .expect("tx line");
    Rig { kernel, serial, uart }
}

impl<const TX: usize> Rig<TX> {
    fn spawn(&self, entry: ThreadEntry, arg: u32) -> ThreadId {
        let stack = Box::leak(vec![0u8; 512].into_boxed_slice());
        let id = self.kernel.create_thread(stack, entry, arg).expect("thread slot");
        self.kernel.enqueue_ready(id).expect("fresh thread");
        id
    }

    fn start(&self) {
        let kernel = self.kernel;
        thread::Builder::new()
            .name("ukern-boot".into())
            .spawn(move || kernel.start())
            .expect("spawn boot thread");
    }

    fn status(&self, id: ThreadId) -> Option<ThreadStatus> {
        self.kernel.status(id)
    }
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn hardware_flow_control_is_reported() {
    let rig: Rig = rig();
    let config = UartConfig {
        flow_control: FlowControl::RtsCts,
        ..UartConfig::with_baud_rate(9600)
    };
    assert_eq!(
        rig.serial.init_with(&config),
        Err(SerialError::Hal(HalError::NotSupported))
    );
    assert_eq!(rig.uart.config().map(|c| c.baud_rate), Some(115_200));
}

#[test]
fn reader_sleeps_until_a_byte_arrives() {
    static RIG: OnceLock<Rig> = OnceLock::new();
    static RECEIVED: AtomicU32 = AtomicU32::new(0);

    fn reader(_: u32) {
        let rig = RIG.get().expect("rig");
        let byte = rig.serial.get_byte().expect("get_byte");
        RECEIVED.store(u32::from(byte) | 0x100, Ordering::SeqCst);
    }

    let rig = RIG.get_or_init(rig);
    let id = rig.spawn(reader, 0);
    rig.start();

    wait_until("the reader to block", || rig.status(id) == Some(ThreadStatus::Blocked));
    assert_eq!(RECEIVED.load(Ordering::SeqCst), 0);

    rig.uart.receive(b"A");
    wait_until("the reader to finish", || rig.status(id) == Some(ThreadStatus::Terminated));
    assert_eq!(RECEIVED.load(Ordering::SeqCst), 0x100 | u32::from(b'A'));
    assert_eq!(rig.serial.rx_available(), 0);
}

#[test]
fn writer_blocks_on_a_full_tx_buffer() {
    static RIG: OnceLock<Rig> = OnceLock::new();

    fn writer(_: u32) {
        let rig = RIG.get().expect("rig");
        for i in 0..128u8 {
            rig.serial.put_byte(i).expect("put_byte");
        }
    }

    let rig = RIG.get_or_init(rig);
    rig.uart.set_tx_ready(false);
    let id = rig.spawn(writer, 0);
    rig.start();

    wait_until("the writer to block", || rig.status(id) == Some(ThreadStatus::Blocked));
    assert_eq!(rig.serial.tx_pending(), 127);
    assert!(rig.uart.transmitted().is_empty());

    rig.uart.set_tx_ready(true);
    wait_until("the writer to finish", || rig.status(id) == Some(ThreadStatus::Terminated));
    wait_until("the wire to carry every byte", || rig.uart.transmitted().len() == 128);
    assert_eq!(rig.uart.transmitted(), (0..128u8).collect::<Vec<_>>());
}

#[test]
fn atomic_write_resumes_after_a_drain() {
    static RIG: OnceLock<Rig<8>> = OnceLock::new();
    static SENT: AtomicUsize = AtomicUsize::new(0);

    fn writer(_: u32) {
        let rig = RIG.get().expect("rig");
        let n = rig.serial.write_atomic(b"0123456789").expect("write_atomic");
        SENT.store(n, Ordering::SeqCst);
    }

    let rig = RIG.get_or_init(rig);
    rig.uart.set_tx_ready(false);
    let id = rig.spawn(writer, 0);
    rig.start();

    wait_until("the writer to block", || rig.status(id) == Some(ThreadStatus::Blocked));
    assert_eq!(rig.serial.tx_pending(), 7);
    assert_eq!(SENT.load(Ordering::SeqCst), 0);

    rig.uart.set_tx_ready(true);
    wait_until("the writer to finish", || rig.status(id) == Some(ThreadStatus::Terminated));
    assert_eq!(SENT.load(Ordering::SeqCst), 10);
    wait_until("the wire to drain", || rig.uart.transmitted().len() == 10);
    assert_eq!(rig.uart.transmitted(), b"0123456789");
}

#[test]
fn atomic_writes_never_interleave() {
    static RIG: OnceLock<Rig> = OnceLock::new();
    const MESSAGES: usize = 3;

    fn message(writer: u32, n: usize) -> Vec<u8> {
        let mut line = format!("<{writer}:{n}:").into_bytes();
        line.extend(std::iter::repeat(b'a' + writer as u8).take(150));
        line.push(b'>');
        line
    }

    fn writer(arg: u32) {
        let rig = RIG.get().expect("rig");
        for n in 0..MESSAGES {
            let line = message(arg, n);
            assert_eq!(rig.serial.write_atomic(&line).expect("write_atomic"), line.len());
            rig.kernel.yield_now();
        }
    }

    let rig = RIG.get_or_init(rig);
    rig.uart.set_tx_ready(false);
    let ids = [rig.spawn(writer, 0), rig.spawn(writer, 1)];
    rig.start();

    wait_until("both writers to block", || {
        ids.iter().all(|&id| rig.status(id) == Some(ThreadStatus::Blocked))
    });
    rig.uart.set_tx_ready(true);
    wait_until("both writers to finish", || {
        ids.iter().all(|&id| rig.status(id) == Some(ThreadStatus::Terminated))
    });

    let expected_len: usize = (0..2)
        .flat_map(|w| (0..MESSAGES).map(move |n| message(w, n).len()))
        .sum();
    wait_until("the wire to drain", || rig.uart.transmitted().len() == expected_len);

    let wire = rig.uart.transmitted();
    let mut seen = Vec::new();
    for chunk in wire.split_inclusive(|&b| b == b'>') {
        let found = (0..2)
            .flat_map(|w| (0..MESSAGES).map(move |n| (w, n)))
            .find(|&(w, n)| message(w, n) == chunk);
        seen.push(found.expect("every chunk is one whole message"));
    }
    seen.sort_unstable();
    assert_eq!(seen.len(), 2 * MESSAGES);
    seen.dedup();
    assert_eq!(seen.len(), 2 * MESSAGES);
}

#[test]
fn atomic_read_fills_the_whole_buffer() {
    static RIG: OnceLock<Rig> = OnceLock::new();
    static WORDS: Mutex<Vec<Vec<u8>>> = parking_lot::const_mutex(Vec::new());

    fn reader(_: u32) {
        let rig = RIG.get().expect("rig");
        for len in [5, 6] {
            let mut word = vec![0u8; len];
            assert_eq!(rig.serial.read_atomic(&mut word).expect("read_atomic"), len);
            WORDS.lock().push(word);
        }
        assert_eq!(rig.serial.read_atomic(&mut []).expect("empty read"), 0);
    }

    let rig = RIG.get_or_init(rig);
    let id = rig.spawn(reader, 0);
    rig.start();

    rig.uart.receive(b"hel");
    wait_until("the reader to wait for more", || {
        rig.status(id) == Some(ThreadStatus::Blocked) && rig.serial.rx_available() == 0
    });
    assert!(WORDS.lock().is_empty());

    rig.uart.receive(b"lo world");
    wait_until("the reader to finish", || rig.status(id) == Some(ThreadStatus::Terminated));
    assert_eq!(*WORDS.lock(), vec![b"hello".to_vec(), b" world".to_vec()]);
}

#[test]
fn formatted_writes_are_truncated() {
    static RIG: OnceLock<Rig> = OnceLock::new();
    static WRITTEN: AtomicUsize = AtomicUsize::new(0);

    fn writer(_: u32) {
        let rig = RIG.get().expect("rig");
        let long = "x".repeat(300);
        let n = rig
            .serial
            .write_fmt_atomic(format_args!("[{}] {}", 7, long))
            .expect("write_fmt_atomic");
        WRITTEN.store(n, Ordering::SeqCst);
        assert_eq!(rig.serial.write_atomic(b"").expect("empty write"), 0);
    }

    let rig = RIG.get_or_init(rig);
    let id = rig.spawn(writer, 0);
    rig.start();

    wait_until("the writer to finish", || rig.status(id) == Some(ThreadStatus::Terminated));
    assert_eq!(WRITTEN.load(Ordering::SeqCst), FMT_BUFFER_SIZE);
    wait_until("the wire to drain", || rig.uart.transmitted().len() == FMT_BUFFER_SIZE);
    let wire = rig.uart.transmitted();
    assert!(wire.starts_with(b"[7] xxx"));
    assert!(wire[4..].iter().all(|&b| b == b'x'));
}

#[test]
fn overflowing_input_is_dropped_and_counted() {
    let rig: Rig = rig();
    rig.start();
    wait_until("idle to run", || rig.kernel.current_thread() == Some(ThreadId::IDLE));

    rig.uart.receive(&[b'z'; 200]);
    wait_until("the receiver to catch up", || {
        rig.serial.rx_available() + rig.serial.dropped_bytes() as usize == 200
    });
    assert_eq!(rig.serial.rx_available(), 127);
    assert_eq!(rig.serial.dropped_bytes(), 73);
}

#[test]
fn one_received_byte_wakes_one_reader() {
    static RIG: OnceLock<Rig> = OnceLock::new();
    static GOT: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];

    fn reader(arg: u32) {
        let rig = RIG.get().expect("rig");
        let byte = rig.serial.get_byte().expect("get_byte");
        GOT[arg as usize].store(0x100 | u32::from(byte), Ordering::SeqCst);
    }

    let rig = RIG.get_or_init(rig);
    let ids = [rig.spawn(reader, 0), rig.spawn(reader, 1)];
    rig.start();
    wait_until("both readers to block", || {
        ids.iter().all(|&id| rig.status(id) == Some(ThreadStatus::Blocked))
    });

    rig.uart.receive(b"x");
    wait_until("the first reader to finish", || {
        rig.status(ids[0]) == Some(ThreadStatus::Terminated)
    });
    // Give the scheduler several ticks to run anything else it woke.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(rig.status(ids[1]), Some(ThreadStatus::Blocked));
    assert_eq!(GOT[0].load(Ordering::SeqCst), 0x100 | u32::from(b'x'));
    assert_eq!(GOT[1].load(Ordering::SeqCst), 0);

    rig.uart.receive(b"y");
    wait_until("the second reader to finish", || {
        rig.status(ids[1]) == Some(ThreadStatus::Terminated)
    });
    assert_eq!(GOT[1].load(Ordering::SeqCst), 0x100 | u32::from(b'y'));
}

#[test]
fn drained_tx_buffer_wakes_one_writer() {
    static RIG: OnceLock<Rig<8>> = OnceLock::new();

    fn writer(arg: u32) {
        let rig = RIG.get().expect("rig");
        for _ in 0..8 {
            rig.serial.put_byte(b'a' + arg as u8).expect("put_byte");
        }
    }

    let rig = RIG.get_or_init(rig);
    rig.uart.set_tx_ready(false);
    let ids = [rig.spawn(writer, 0), rig.spawn(writer, 1)];
    rig.start();
    wait_until("both writers to block", || {
        ids.iter().all(|&id| rig.status(id) == Some(ThreadStatus::Blocked))
    });
    assert_eq!(rig.serial.tx_pending(), 7);

    // Play the transmitter by hand: seven bytes out, then the empty event.
    for _ in 0..7 {
        rig.serial.on_tx_empty_interrupt();
    }
    assert_eq!(rig.uart.transmitted(), b"aaaaaaa");
    assert!(ids.iter().all(|&id| rig.status(id) == Some(ThreadStatus::Blocked)));

    rig.serial.on_tx_empty_interrupt();
    assert_ne!(rig.status(ids[0]), Some(ThreadStatus::Blocked));
    assert_eq!(rig.status(ids[1]), Some(ThreadStatus::Blocked));

    wait_until("the first writer to finish", || {
        rig.status(ids[0]) == Some(ThreadStatus::Terminated)
    });
    thread::sleep(Duration::from_millis(20));
    assert_eq!(rig.status(ids[1]), Some(ThreadStatus::Blocked));

    rig.uart.set_tx_ready(true);
    wait_until("the second writer to finish", || {
        rig.status(ids[1]) == Some(ThreadStatus::Terminated)
    });
    wait_until("the wire to drain", || rig.uart.transmitted().len() == 16);
    assert_eq!(rig.uart.transmitted(), b"aaaaaaaabbbbbbbb");
}

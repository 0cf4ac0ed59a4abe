//! Helpers shared by the simulation integration tests.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use ukern::{Kernel, KernelConfig, ThreadEntry, ThreadId, ThreadStatus};
use ukern_port_sim::SimPort;

pub type SimKernel = &'static Kernel<SimPort>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn kernel(config: KernelConfig) -> SimKernel {
    Box::leak(Box::new(Kernel::new(SimPort::new(), config)))
}

/// A tick slow enough that tests observe cooperative scheduling only.
pub fn slow_tick() -> KernelConfig {
    KernelConfig::builder().tick_period_us(1_000_000).build()
}

pub fn stack() -> &'static mut [u8] {
    Box::leak(vec![0u8; 512].into_boxed_slice())
}

/// Creates a thread and puts it on the ready queue.
pub fn spawn(kernel: SimKernel, entry: ThreadEntry, arg: u32) -> ThreadId {
    let id = kernel.create_thread(stack(), entry, arg).expect("thread slot");
    kernel.enqueue_ready(id).expect("fresh thread");
    id
}

/// Boots the kernel on a dedicated host thread.
pub fn start(kernel: SimKernel) {
    thread::Builder::new()
        .name("ukern-boot".into())
        .spawn(move || kernel.start())
        .expect("spawn boot thread");
}

pub fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn terminated(kernel: SimKernel, ids: &[ThreadId]) -> bool {
    ids.iter()
        .all(|&id| kernel.status(id) == Some(ThreadStatus::Terminated))
}

//! # ukern - Round-Robin Micro-Kernel
//!
//! A small kernel for single-core microcontrollers. Every thread has a fixed
//! stack and a slot in a static thread table; threads are scheduled
//! round-robin from a single ready queue, preempted by a periodic tick and
//! free to block on wait queues owned by synchronization objects and drivers.
//!
//! ## Architecture
//!
//! **Threads**: created once before [`Kernel::start`], never destroyed. A
//! thread whose entry function returns becomes `Terminated` and is never
//! scheduled again.
//!
//! **Queues**: the ready queue and every wait queue are intrusive FIFOs
//! threaded through the thread table, so a thread is a member of at most one
//! queue at a time.
//!
//! **Scheduling**: [`Kernel::dispatch`] rotates the running thread to the tail
//! of the ready queue and resumes the head. The idle thread runs only when
//! the ready queue is empty.
//!
//! **Ports**: everything architecture specific (register save/restore,
//! interrupt masking, the tick timer) sits behind the [`Port`] trait.
//!
//! ## Module Overview
//!
//! - [`thread`] - thread identifiers, status and control blocks
//! - [`queue`] - intrusive FIFO of threads
//! - [`kernel`] - scheduler, dispatch and block/wake primitives
//! - [`mutex`] - hand-off mutex with FIFO waiters
//! - [`port`] - execution-context boundary
//! - [`config`] - kernel configuration and limits
//! - [`trace`] - scheduler trace events

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod config;
pub mod error;
pub mod kernel;
pub mod mutex;
pub mod port;
pub mod queue;
pub mod thread;
pub mod trace;


pub use config::{KernelConfig, KernelConfigBuilder, IDLE_STACK_SIZE, MAX_THREADS};
pub use error::KernelError;
pub use kernel::Kernel;
pub use mutex::Mutex;
pub use port::{Port, TickHandler};
pub use queue::ThreadQueue;
pub use thread::{Stack, ThreadEntry, ThreadId, ThreadStatus, Trampoline};
pub use trace::{TraceEvent, TraceHook};

/// Re-exported so drivers can name the critical-section token without
/// depending on the crate directly.
pub use critical_section::CriticalSection;

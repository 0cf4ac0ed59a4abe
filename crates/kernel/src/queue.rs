//! Intrusive FIFO queues of threads.
//!
//! A [`ThreadQueue`] only stores its head, tail and length; the links live in
//! the thread control blocks. That keeps every queue O(1) and allocation
//! free, and lets a queue be embedded in any object (a mutex, a driver) that
//! threads wait on. Queue operations therefore go through the kernel, which
//! owns the thread table: see [`Kernel::enqueue`](crate::Kernel::enqueue) and
//! [`Kernel::dequeue`](crate::Kernel::dequeue).

use crate::config::MAX_THREADS;
use crate::error::KernelError;
use crate::thread::{Links, Tcb, ThreadId, ThreadStatus};

/// Application slots plus the idle slot.
pub(crate) const SLOTS: usize = MAX_THREADS + 1;

/// FIFO sequence of threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadQueue {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
    len: usize,
}

impl ThreadQueue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Thread that the next dequeue returns.
    pub fn front(&self) -> Option<ThreadId> {
        self.head
    }
}

/// Static thread table. Owns every TCB, and with it every queue link.
pub(crate) struct ThreadTable {
    tcbs: [Option<Tcb>; SLOTS],
}

impl ThreadTable {
    pub(crate) const fn new() -> Self {
        Self {
            tcbs: [None; SLOTS],
        }
    }

    /// Places `tcb` in the first free application slot.
    pub(crate) fn allocate(&mut self, tcb: Tcb) -> Result<ThreadId, KernelError> {
        let index = self.tcbs[..MAX_THREADS]
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::ThreadTableFull)?;
        self.tcbs[index] = Some(tcb);
        Ok(ThreadId(index as u8))
    }

    pub(crate) fn install_idle(&mut self, tcb: Tcb) {
        self.tcbs[ThreadId::IDLE.index()] = Some(tcb);
    }

    pub(crate) fn get(&self, id: ThreadId) -> Option<&Tcb> {
        self.tcbs.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> Option<&mut Tcb> {
        self.tcbs.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn tcb_mut(&mut self, id: ThreadId) -> Result<&mut Tcb, KernelError> {
        self.get_mut(id).ok_or(KernelError::UnknownThread(id))
    }

    /// Appends `id` to the tail of `queue`.
    ///
    /// Fails, leaving every queue untouched, if the thread is already a
    /// member of a queue or has terminated.
    pub(crate) fn enqueue(&mut self, queue: &mut ThreadQueue, id: ThreadId) -> Result<(), KernelError> {
        let tcb = self.tcb_mut(id)?;
        if tcb.links.queued {
            return Err(KernelError::AlreadyLinked(id));
        }
        if tcb.status == ThreadStatus::Terminated {
            return Err(KernelError::Terminated(id));
        }
        tcb.links = Links {
            prev: queue.tail,
            next: None,
            queued: true,
        };

        match queue.tail {
            Some(tail) => self.tcb_mut(tail)?.links.next = Some(id),
            None => queue.head = Some(id),
        }
        queue.tail = Some(id);
        queue.len += 1;
        Ok(())
    }

    /// Removes and returns the head of `queue`, clearing its links.
    pub(crate) fn dequeue(&mut self, queue: &mut ThreadQueue) -> Option<ThreadId> {
        let head = queue.head?;
        let links = core::mem::take(&mut self.get_mut(head)?.links);
        debug_assert!(links.queued && links.prev.is_none());

        queue.head = links.next;
        match links.next {
            Some(next) => {
                if let Some(tcb) = self.get_mut(next) {
                    tcb.links.prev = None;
                }
            }
            None => queue.tail = None,
        }
        queue.len -= 1;
        Some(head)
    }

    /// Members of `queue`, head first.
    pub(crate) fn iter<'a>(&'a self, queue: &ThreadQueue) -> impl Iterator<Item = ThreadId> + 'a {
        let mut cursor = queue.head;
        core::iter::from_fn(move || {
            let id = cursor?;
            cursor = self.get(id).and_then(|tcb| tcb.links.next);
            Some(id)
        })
    }
}

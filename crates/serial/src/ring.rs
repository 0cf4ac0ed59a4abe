//! Fixed-capacity byte ring buffer.
//!
//! `head` is the next slot to write and `tail` the next slot to read; the
//! buffer is empty when they are equal. One slot is always left unused so
//! that "full" and "empty" can be told apart, which makes the usable
//! capacity `N - 1`.

/// Circular byte store with `N` slots and `N - 1` usable bytes.
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: usize,
    tail: usize,
}

impl<const N: usize> RingBuffer<N> {
    const VALID: () = assert!(N >= 2, "a ring buffer needs at least two slots");

    pub const fn new() -> Self {
        let () = Self::VALID;
        Self {
            buf: [0; N],
            head: 0,
            tail: 0,
        }
    }

    /// Usable capacity, `N - 1`.
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            N - (self.tail - self.head)
        }
    }

    /// Bytes that can be pushed before the buffer is full.
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        (self.head + 1) % N == self.tail
    }

    /// Appends a byte, handing it back if the buffer is full.
    pub fn push(&mut self, byte: u8) -> Result<(), u8> {
        if self.is_full() {
            return Err(byte);
        }
        self.buf[self.head] = byte;
        self.head = (self.head + 1) % N;
        Ok(())
    }

    /// Removes the oldest byte.
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.tail];
        self.tail = (self.tail + 1) % N;
        Some(byte)
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

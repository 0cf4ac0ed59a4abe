use core::fmt;

use heapless::Vec;

/// Formatting sink that keeps the first `N` bytes and drops the rest.
pub(crate) struct Truncating<const N: usize> {
    buf: Vec<u8, N>,
    truncated: bool,
}

impl<const N: usize> Truncating<N> {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::new(),
            truncated: false,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<const N: usize> fmt::Write for Truncating<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.buf.len();
        let (fits, rest) = s.as_bytes().split_at(s.len().min(room));
        // `fits` never exceeds the remaining capacity.
        let _ = self.buf.extend_from_slice(fits);
        self.truncated |= !rest.is_empty();
        Ok(())
    }
}

// SPDX-License-Identifier: MIT
//
// OutputBuffer — the compositor's per-frame scratch.
//
// The true-color compositor accumulates a whole frame of escapes and text
// here and hands it to the console in one write. The buffer lives as long
// as the compositor: it is cleared, not reallocated, at the start of every
// paint, so steady-state painting does not touch the allocator.
//
// Growth is explicit: when an append would not fit, capacity doubles (or
// jumps straight to what the append needs, if that is larger).

use std::io::{self, Write};

/// Initial capacity: one 120×80 screen of single-byte cells.
pub const DEFAULT_CAPACITY: usize = 120 * 80;

/// A growable byte buffer that accumulates one frame of output.
#[derive(Debug)]
pub struct OutputBuffer {
    buf: Vec<u8>,
}

impl OutputBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The accumulated output as text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if raw bytes written through `io::Write` were
    /// not valid UTF-8. Output produced by `push_str`, `push` and the `ansi`
    /// functions always is.
    pub fn as_str(&self) -> io::Result<&str> {
        std::str::from_utf8(&self.buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Make room for `additional` more bytes, doubling when short.
    fn grow_for(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        let cap = self.buf.capacity();
        if needed > cap {
            let target = (cap * 2).max(needed).max(16);
            self.buf.reserve_exact(target - self.buf.len());
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.grow_for(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn push(&mut self, ch: char) {
        let mut enc = [0u8; 4];
        self.push_str(ch.encode_utf8(&mut enc));
    }

    /// Empty the buffer, keeping its capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Write for OutputBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.grow_for(buf.len());
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

/// Compares two byte strings in time independent of the first differing
/// position. Used for the PASS check.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// The fixed buffer behind a [`ByteCursor`] ran out of space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOverflow;

/// Append-only cursor over a fixed byte slice.
///
/// `fmt::Write` fails once the slice is full, so formatting into a reply or
/// transfer buffer surfaces overflow instead of truncating silently.
pub struct ByteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Appends raw bytes, failing when the remaining capacity is too small.
    pub fn put(&mut self, bytes: &[u8]) -> Result<(), CursorOverflow> {
        let end = self.pos.checked_add(bytes.len()).ok_or(CursorOverflow)?;
        if end > self.buf.len() {
            return Err(CursorOverflow);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

impl fmt::Write for ByteCursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Non-blocking CRLF framing for the control channel.
//!
//! The reader stages raw bytes in a fixed buffer and yields at most one
//! event per poll. A yielded line slice stays valid until the next poll:
//! consumption is deferred and the buffer is only shifted on re-entry.

use tracing::debug;

use crate::backend::net::{Net, NetError};

/// Outcome of one poll.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent<'a> {
    /// A complete line, CRLF excluded.
    Line(&'a [u8]),
    /// A line exceeded the staging buffer; it has been discarded through
    /// its terminating CRLF.
    TooLong,
    /// Nothing complete yet.
    Pending,
}

pub struct LineReader {
    buf: Box<[u8]>,
    len: usize,
    /// Prefix to drop at the start of the next poll.
    consume: usize,
    discarding: bool,
}

impl LineReader {
    pub fn new(command_max: usize) -> Self {
        Self {
            buf: vec![0u8; command_max].into_boxed_slice(),
            len: 0,
            consume: 0,
            discarding: false,
        }
    }

    /// Drops all staged state. Called when the control connection goes away.
    pub fn reset(&mut self) {
        self.len = 0;
        self.consume = 0;
        self.discarding = false;
    }

    /// Advances the framer by at most one `Net::read` and yields at most
    /// one event. Consecutive buffered lines come out of successive polls
    /// without touching the transport again.
    pub fn poll<'a, N: Net>(
        &'a mut self,
        net: &mut N,
        conn: &mut N::Conn,
    ) -> Result<LineEvent<'a>, NetError> {
        if self.consume > 0 {
            self.buf.copy_within(self.consume..self.len, 0);
            self.len -= self.consume;
            self.consume = 0;
        }

        if self.discarding {
            return self.poll_discard(net, conn);
        }

        if find_crlf(&self.buf[..self.len]).is_none() {
            if self.len == self.buf.len() {
                debug!(len = self.len, "command line exceeds buffer, discarding");
                self.enter_discard();
                return self.poll_discard(net, conn);
            }
            match net.read(conn, &mut self.buf[self.len..]) {
                Ok(0) => return Err(NetError::Closed),
                Ok(n) => self.len += n,
                Err(NetError::WouldBlock) => return Ok(LineEvent::Pending),
                Err(err) => return Err(err),
            }
        }

        match find_crlf(&self.buf[..self.len]) {
            Some(i) => {
                self.consume = i + 2;
                Ok(LineEvent::Line(&self.buf[..i]))
            }
            None if self.len == self.buf.len() => {
                debug!(len = self.len, "command line exceeds buffer, discarding");
                self.enter_discard();
                Ok(LineEvent::Pending)
            }
            None => Ok(LineEvent::Pending),
        }
    }

    /// Keeps only a trailing `\r` so a CRLF split across reads is still
    /// detected.
    fn enter_discard(&mut self) {
        self.discarding = true;
        self.len = if self.len > 0 && self.buf[self.len - 1] == b'\r' {
            self.buf[0] = b'\r';
            1
        } else {
            0
        };
    }

    fn poll_discard<N: Net>(
        &mut self,
        net: &mut N,
        conn: &mut N::Conn,
    ) -> Result<LineEvent<'static>, NetError> {
        match net.read(conn, &mut self.buf[self.len..]) {
            Ok(0) => return Err(NetError::Closed),
            Ok(n) => self.len += n,
            Err(NetError::WouldBlock) => return Ok(LineEvent::Pending),
            Err(err) => return Err(err),
        }
        if let Some(i) = find_crlf(&self.buf[..self.len]) {
            self.buf.copy_within(i + 2..self.len, 0);
            self.len -= i + 2;
            self.discarding = false;
            return Ok(LineEvent::TooLong);
        }
        if self.len == self.buf.len() {
            self.len = if self.buf[self.len - 1] == b'\r' {
                self.buf[0] = b'\r';
                1
            } else {
                0
            };
        }
        Ok(LineEvent::Pending)
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

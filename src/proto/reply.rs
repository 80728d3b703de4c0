// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reply staging and resumable flushing for the control channel.
//!
//! Replies are formatted into a fixed buffer and drained towards the client
//! across as many ticks as the transport needs. While bytes are pending no
//! new reply may be staged and no command line is read, which is what keeps
//! the `150 … 226` sequences of a transfer free of interleaved replies.

use core::fmt::{self, Write};

use thiserror::Error;
use tracing::warn;

use crate::{
    backend::{
        fs::FsError,
        net::{Net, NetError},
    },
    utils::ByteCursor,
};

/// Reply staging failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReplyError {
    /// A previous reply has not been fully flushed yet.
    #[error("a reply is already pending")]
    Busy,
    /// The formatted line does not fit the reply buffer.
    #[error("reply buffer overflow")]
    Overflow,
}

pub struct ReplyWriter {
    buf: Box<[u8]>,
    len: usize,
    off: usize,
}

impl ReplyWriter {
    pub fn new(reply_max: usize) -> Self {
        Self { buf: vec![0u8; reply_max].into_boxed_slice(), len: 0, off: 0 }
    }

    /// True while staged bytes have not fully reached the transport.
    pub fn is_pending(&self) -> bool {
        self.off < self.len
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.off = 0;
    }

    /// Stages `"<code> <text>\r\n"`. Refuses while a reply is pending.
    pub fn queue(&mut self, code: u16, text: &str) -> Result<(), ReplyError> {
        self.stage(|cur| {
            write!(cur, "{code} {text}\r\n").map_err(|_| ReplyError::Overflow)
        })
    }

    pub fn queue_fmt(
        &mut self,
        code: u16,
        text: fmt::Arguments<'_>,
    ) -> Result<(), ReplyError> {
        self.stage(|cur| {
            write!(cur, "{code} {text}\r\n").map_err(|_| ReplyError::Overflow)
        })
    }

    /// Stages `"<code> \"<path>\"\r\n"`. The path is raw bytes so non-UTF-8
    /// names survive the round trip.
    pub fn queue_quoted(&mut self, code: u16, path: &[u8]) -> Result<(), ReplyError> {
        self.stage(|cur| {
            write!(cur, "{code} \"").map_err(|_| ReplyError::Overflow)?;
            cur.put(path).map_err(|_| ReplyError::Overflow)?;
            cur.put(b"\"\r\n").map_err(|_| ReplyError::Overflow)
        })
    }

    /// Stages the three-part FEAT form: `211-Features:`, one indented
    /// feature per line, `211 End`.
    pub fn queue_feat(&mut self, features: &[&str]) -> Result<(), ReplyError> {
        self.stage(|cur| {
            cur.put(b"211-Features:\r\n").map_err(|_| ReplyError::Overflow)?;
            for feat in features {
                write!(cur, " {feat}\r\n").map_err(|_| ReplyError::Overflow)?;
            }
            cur.put(b"211 End\r\n").map_err(|_| ReplyError::Overflow)
        })
    }

    fn stage<G>(&mut self, fill: G) -> Result<(), ReplyError>
    where
        G: FnOnce(&mut ByteCursor<'_>) -> Result<(), ReplyError>,
    {
        if self.is_pending() {
            return Err(ReplyError::Busy);
        }
        let mut cur = ByteCursor::new(&mut self.buf);
        match fill(&mut cur) {
            Ok(()) => {
                self.len = cur.pos();
                self.off = 0;
                Ok(())
            }
            Err(err) => {
                self.len = 0;
                self.off = 0;
                Err(err)
            }
        }
    }

    /// Best-effort staging used by the protocol handlers, which guarantee no
    /// reply is pending before dispatching. Overflow degrades to the bare
    /// `451` of the internal-error row.
    pub fn post(&mut self, code: u16, text: &str) {
        self.post_fmt(code, format_args!("{text}"));
    }

    pub fn post_fmt(&mut self, code: u16, text: fmt::Arguments<'_>) {
        let res = self.queue_fmt(code, text);
        self.degrade(code, res);
    }

    pub fn post_quoted(&mut self, code: u16, path: &[u8]) {
        let res = self.queue_quoted(code, path);
        self.degrade(code, res);
    }

    pub fn post_feat(&mut self, features: &[&str]) {
        let res = self.queue_feat(features);
        self.degrade(211, res);
    }

    /// Maps a backend failure through the uniform table and stages the
    /// resulting reply.
    pub fn post_fs_error(&mut self, err: FsError) {
        let (code, text) = reply_for_fs_error(err);
        self.post(code, text);
    }

    fn degrade(&mut self, code: u16, res: Result<(), ReplyError>) {
        match res {
            Ok(()) => {}
            Err(ReplyError::Busy) => {
                warn!(code, "dropped reply, another is still pending");
            }
            Err(ReplyError::Overflow) => {
                warn!(code, "reply buffer overflow");
                let (fallback, text) = reply_for_fs_error(FsError::Io);
                if self.queue(fallback, text).is_err() {
                    self.clear();
                }
            }
        }
    }

    /// Drains staged bytes towards the client; returns `true` once empty.
    /// A zero-byte write means the peer is gone.
    pub fn flush<N: Net>(
        &mut self,
        net: &mut N,
        conn: &mut N::Conn,
    ) -> Result<bool, NetError> {
        while self.off < self.len {
            match net.write(conn, &self.buf[self.off..self.len]) {
                Ok(0) => return Err(NetError::Closed),
                Ok(n) => self.off += n,
                Err(NetError::WouldBlock) => return Ok(false),
                Err(err) => return Err(err),
            }
        }
        self.len = 0;
        self.off = 0;
        Ok(true)
    }
}

/// The uniform mapping from backend failures to FTP replies, shared by the
/// path-based command handlers and the transfer abort paths.
pub fn reply_for_fs_error(err: FsError) -> (u16, &'static str) {
    match err {
        FsError::InvalidPath => {
            (553, "Requested action not taken. File name not allowed")
        }
        FsError::NoSpace => (452, "Insufficient storage space"),
        FsError::Io => (451, "Requested action aborted: local error in processing"),
        FsError::PermissionDenied | FsError::ReadOnly => (550, "Permission denied"),
        FsError::NotFound => (550, "File not found"),
        FsError::Exists => (550, "File exists"),
        FsError::Unsupported => (502, "Command not implemented"),
        FsError::IsDir | FsError::NotDir => (550, "Requested action not taken"),
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Directory-listing transfer state machine.
//!
//! Per tick the record either formats one entry into the transfer buffer or
//! flushes staged bytes towards the data connection, never both, so a tick
//! stays bounded. The `150` is withheld until the client has actually
//! connected to the passive listener.

use core::fmt::Write;

use tracing::debug;

use crate::{
    backend::{
        fs::{DirEntry, EntryKind, Fs, FsError},
        net::{Net, NetError},
    },
    proto::reply::{ReplyWriter, reply_for_fs_error},
    server::pasv::{Pasv, PasvPhase},
    transfer::common::{TransferPhase, Window},
    utils::{ByteCursor, CursorOverflow},
};

enum EntryStep {
    Formatted(usize),
    Exhausted,
    Failed(FsError),
}

pub struct ListTransfer<F: Fs> {
    phase: TransferPhase,
    iter: Option<F::DirIter>,
    window: Window,
    exhausted: bool,
}

impl<F: Fs> ListTransfer<F> {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::Idle,
            iter: None,
            window: Window::default(),
            exhausted: false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == TransferPhase::Idle
    }

    pub fn is_waiting(&self) -> bool {
        self.phase == TransferPhase::WaitingAccept
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == TransferPhase::Streaming
    }

    /// Arms the record once the directory stream is open. No reply is
    /// emitted here.
    pub fn open(&mut self, iter: F::DirIter) {
        self.iter = Some(iter);
        self.window.clear();
        self.exhausted = false;
        self.phase = TransferPhase::WaitingAccept;
    }

    /// Releases the stream without touching the control channel. Used at
    /// session teardown.
    pub fn release(&mut self, fs: &mut F) {
        if let Some(iter) = self.iter.take() {
            fs.dir_close(iter);
        }
        self.window.clear();
        self.exhausted = false;
        self.phase = TransferPhase::Idle;
    }

    /// Advances the transfer by at most one unit of work. `progress` is set
    /// whenever bytes moved, for the transfer idle timeout.
    pub fn advance<N: Net>(
        &mut self,
        net: &mut N,
        fs: &mut F,
        pasv: &mut Pasv<N>,
        reply: &mut ReplyWriter,
        buf: &mut [u8],
        progress: &mut bool,
    ) {
        if self.phase == TransferPhase::Idle || reply.is_pending() {
            return;
        }

        if self.phase == TransferPhase::WaitingAccept {
            if !pasv.has_conn() {
                if pasv.phase == PasvPhase::Listening {
                    return;
                }
                self.abort(net, fs, pasv, reply, 425, "Can't open data connection");
                return;
            }
            reply.post(150, "Here comes the directory listing");
            self.phase = TransferPhase::Streaming;
            pasv.phase = PasvPhase::Transferring;
            *progress = true;
            return;
        }

        if !self.window.is_empty() {
            let Some(conn) = pasv.conn_mut() else {
                self.abort_closed(net, fs, pasv, reply);
                return;
            };
            match net.write(conn, &buf[self.window.off..self.window.len]) {
                Ok(0) | Err(NetError::Closed) => {
                    self.abort_closed(net, fs, pasv, reply);
                }
                Ok(n) => {
                    self.window.off += n;
                    *progress = true;
                }
                Err(NetError::WouldBlock) => {}
                Err(err) => {
                    debug!(?err, "data write failed during listing");
                    self.abort_closed(net, fs, pasv, reply);
                }
            }
            return;
        }

        if !self.exhausted {
            let Some(iter) = self.iter.as_mut() else {
                self.abort_fs(net, fs, pasv, reply, FsError::Io);
                return;
            };
            let step = match fs.dir_next(iter) {
                Ok(Some(entry)) => match format_entry(buf, &entry) {
                    Ok(len) => EntryStep::Formatted(len),
                    Err(CursorOverflow) => EntryStep::Failed(FsError::Io),
                },
                Ok(None) => EntryStep::Exhausted,
                Err(err) => EntryStep::Failed(err),
            };
            match step {
                EntryStep::Formatted(len) => {
                    self.window.set(len);
                    *progress = true;
                }
                EntryStep::Exhausted => self.exhausted = true,
                EntryStep::Failed(err) => self.abort_fs(net, fs, pasv, reply, err),
            }
            return;
        }

        // Every entry is out and acknowledged by the transport.
        debug!("directory listing complete");
        self.release(fs);
        pasv.close_all(net);
        reply.post(226, "Directory send OK");
    }

    fn abort_closed<N: Net>(
        &mut self,
        net: &mut N,
        fs: &mut F,
        pasv: &mut Pasv<N>,
        reply: &mut ReplyWriter,
    ) {
        self.abort(net, fs, pasv, reply, 426, "Connection closed; transfer aborted");
    }

    fn abort_fs<N: Net>(
        &mut self,
        net: &mut N,
        fs: &mut F,
        pasv: &mut Pasv<N>,
        reply: &mut ReplyWriter,
        err: FsError,
    ) {
        let (code, text) = reply_for_fs_error(err);
        self.abort(net, fs, pasv, reply, code, text);
    }

    fn abort<N: Net>(
        &mut self,
        net: &mut N,
        fs: &mut F,
        pasv: &mut Pasv<N>,
        reply: &mut ReplyWriter,
        code: u16,
        text: &str,
    ) {
        self.release(fs);
        pasv.close_all(net);
        reply.post(code, text);
    }
}

impl<F: Fs> Default for ListTransfer<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// `"<mode> 1 owner group <size> Jan 01 00:00 <name>\r\n"`. The name is
/// appended as raw bytes so non-UTF-8 entries survive.
fn format_entry(buf: &mut [u8], entry: &DirEntry<'_>) -> Result<usize, CursorOverflow> {
    let mode = match entry.kind {
        EntryKind::Dir => "drwxr-xr-x",
        EntryKind::File => "-rw-r--r--",
    };
    let size = entry.size.unwrap_or(0);
    let mut cur = ByteCursor::new(buf);
    write!(cur, "{mode} 1 owner group {size} Jan 01 00:00 ")
        .map_err(|_| CursorOverflow)?;
    cur.put(entry.name)?;
    cur.put(b"\r\n")?;
    Ok(cur.pos())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Download (RETR) transfer state machine.
//!
//! One `Fs::read` + `Net::write` pair per tick at most. A zero-length file
//! read marks end of file; the `226` goes out once the last staged chunk
//! has been accepted by the transport.

use tracing::debug;

use crate::{
    backend::{
        fs::{Fs, FsError},
        net::{Net, NetError},
    },
    proto::reply::{ReplyWriter, reply_for_fs_error},
    server::pasv::{Pasv, PasvPhase},
    transfer::common::{TransferPhase, Window},
};

pub struct RetrTransfer<F: Fs> {
    phase: TransferPhase,
    file: Option<F::FileRead>,
    window: Window,
    eof: bool,
}

impl<F: Fs> RetrTransfer<F> {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::Idle,
            file: None,
            window: Window::default(),
            eof: false,
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

    /// Arms the record once the file is open for reading.
    pub fn open(&mut self, file: F::FileRead) {
        self.file = Some(file);
        self.window.clear();
        self.eof = false;
        self.phase = TransferPhase::WaitingAccept;
    }

    pub fn release(&mut self, fs: &mut F) {
        if let Some(file) = self.file.take() {
            fs.close_read(file);
        }
        self.window.clear();
        self.eof = false;
        self.phase = TransferPhase::Idle;
    }

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
            reply.post(150, "Opening data connection");
            self.phase = TransferPhase::Streaming;
            pasv.phase = PasvPhase::Transferring;
            *progress = true;
            return;
        }

        if self.window.is_empty() && !self.eof {
            let Some(file) = self.file.as_mut() else {
                self.abort_fs(net, fs, pasv, reply, FsError::Io);
                return;
            };
            match fs.read(file, buf) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.window.set(n);
                    *progress = true;
                }
                Err(err) => {
                    self.abort_fs(net, fs, pasv, reply, err);
                    return;
                }
            }
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
                    debug!(?err, "data write failed during download");
                    self.abort_closed(net, fs, pasv, reply);
                }
            }
            return;
        }

        if self.eof {
            debug!("download complete");
            self.release(fs);
            pasv.close_all(net);
            reply.post(226, "Closing data connection");
        }
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

impl<F: Fs> Default for RetrTransfer<F> {
    fn default() -> Self {
        Self::new()
    }
}

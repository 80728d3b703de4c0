// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Upload (STOR) transfer state machine.
//!
//! One `Net::read` + `Fs::write` pair per tick at most. A closed data
//! connection or a zero-length read marks end of the upload; staged bytes
//! are drained to the file across further ticks before the `226`. A
//! zero-length file write is a local failure and aborts with `451`.

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

pub struct StorTransfer<F: Fs> {
    phase: TransferPhase,
    file: Option<F::FileWrite>,
    window: Window,
    eof: bool,
}

impl<F: Fs> StorTransfer<F> {
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

    /// Arms the record once the file is open for truncating write.
    pub fn open(&mut self, file: F::FileWrite) {
        self.file = Some(file);
        self.window.clear();
        self.eof = false;
        self.phase = TransferPhase::WaitingAccept;
    }

    pub fn release(&mut self, fs: &mut F) {
        if let Some(file) = self.file.take() {
            fs.close_write(file);
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
            match pasv.conn_mut() {
                None => self.eof = true,
                Some(conn) => match net.read(conn, buf) {
                    Ok(0) | Err(NetError::Closed) => self.eof = true,
                    Ok(n) => {
                        self.window.set(n);
                        *progress = true;
                    }
                    Err(NetError::WouldBlock) => return,
                    Err(err) => {
                        debug!(?err, "data read failed during upload");
                        self.abort(
                            net,
                            fs,
                            pasv,
                            reply,
                            426,
                            "Connection closed; transfer aborted",
                        );
                        return;
                    }
                },
            }
        }

        if !self.window.is_empty() {
            let Some(file) = self.file.as_mut() else {
                self.abort_fs(net, fs, pasv, reply, FsError::Io);
                return;
            };
            match fs.write(file, &buf[self.window.off..self.window.len]) {
                Ok(0) => self.abort_fs(net, fs, pasv, reply, FsError::Io),
                Ok(n) => {
                    self.window.off += n;
                    *progress = true;
                }
                Err(err) => self.abort_fs(net, fs, pasv, reply, err),
            }
            return;
        }

        if self.eof {
            debug!("upload complete");
            self.release(fs);
            pasv.close_all(net);
            reply.post(226, "Closing data connection");
        }
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

impl<F: Fs> Default for StorTransfer<F> {
    fn default() -> Self {
        Self::new()
    }
}

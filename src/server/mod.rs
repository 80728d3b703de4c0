// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The cooperatively scheduled server driver.
//!
//! All progress happens inside [`FtpServer::tick`]; the engine owns no
//! threads and never blocks. Per tick, in strict order: accept or reject a
//! control connection, flush pending reply bytes, poll the passive-mode
//! accept, drive each transfer by one step, read and dispatch at most one
//! command line, and enforce idle timeouts. The ordering is what guarantees
//! a transfer's `150 … 226` pair is never interleaved with other replies.

mod engine;
pub mod pasv;
pub mod session;

use thiserror::Error;
use tracing::debug;

use crate::{
    backend::{fs::Fs, net::{Net, NetError}},
    cfg::config::Config,
    proto::{
        line::{LineEvent, LineReader},
        reply::ReplyWriter,
    },
    server::{
        engine::Engine,
        pasv::Pasv,
        session::{AuthPhase, Session},
    },
    transfer::{list::ListTransfer, retr::RetrTransfer, stor::StorTransfer},
};

/// Failure constructing the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport: {0}")]
    Net(#[from] NetError),
}

/// The protocol engine. Owns the control listener, the single session, and
/// every fixed buffer.
pub struct FtpServer<N: Net, F: Fs> {
    reader: LineReader,
    eng: Engine<N, F>,
}

impl<N: Net, F: Fs> FtpServer<N, F> {
    /// Binds the control listener and allocates the fixed buffers. The
    /// configuration should have been validated beforehand.
    pub fn new(mut net: N, fs: F, cfg: Config) -> Result<Self, ServerError> {
        let listener = net.bind_control(cfg.server.listen_address)?;
        let reader = LineReader::new(cfg.limits.command_max);
        let reply = ReplyWriter::new(cfg.limits.reply_max);
        let transfer_buf = vec![0u8; cfg.limits.transfer_max].into_boxed_slice();
        let scratch = vec![0u8; cfg.limits.scratch_max].into_boxed_slice();
        Ok(Self {
            reader,
            eng: Engine {
                cfg,
                net,
                fs,
                listener,
                control: None,
                reply,
                session: Session::new(),
                pasv: Pasv::new(),
                list: ListTransfer::new(),
                retr: RetrTransfer::new(),
                stor: StorTransfer::new(),
                transfer_buf,
                scratch,
                ctrl_last_ms: 0,
                pasv_last_ms: 0,
                xfer_last_ms: 0,
            },
        })
    }

    /// True while a control connection is attached.
    pub fn session_active(&self) -> bool {
        self.eng.control.is_some()
    }

    /// One bounded unit of cooperative progress. `now_ms` must be
    /// monotonically non-decreasing; it is only consulted for timeouts.
    pub fn tick(&mut self, now_ms: u64) {
        self.eng.accept_control(now_ms);

        if self.eng.control.is_some() {
            self.eng.flush_reply(now_ms);

            // QUIT closes once its 221 has left the buffer.
            if self.eng.control.is_some()
                && self.eng.session.auth == AuthPhase::Closing
                && !self.eng.reply.is_pending()
            {
                self.eng.teardown_session();
            }
        }

        if self.eng.control.is_some() {
            self.eng.poll_pasv(now_ms);
            self.eng.drive_transfers(now_ms);
            self.read_command(now_ms);
            self.eng.check_timeouts(now_ms);
        }

        if self.eng.control.is_none() {
            self.reader.reset();
        }
    }

    fn read_command(&mut self, now_ms: u64) {
        if !self.eng.ready_for_command() {
            return;
        }
        let Some(conn) = self.eng.control.as_mut() else {
            return;
        };
        match self.reader.poll(&mut self.eng.net, conn) {
            Ok(LineEvent::Line(line)) => self.eng.handle_line(line, now_ms),
            Ok(LineEvent::TooLong) => self.eng.reply.post(500, "Line too long"),
            Ok(LineEvent::Pending) => {}
            Err(err) => {
                debug!(?err, "control read failed");
                self.eng.teardown_session();
            }
        }
    }
}

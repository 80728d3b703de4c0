// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command dispatch and per-tick orchestration state.
//!
//! The engine owns everything below the line reader: transport and
//! filesystem backends, the control connection, the reply writer, the
//! passive-mode resources, and the three transfer records. The driver in
//! [`crate::server`] feeds it parsed lines and tick pulses.

use std::str;

use tracing::{debug, info, warn};

use crate::{
    backend::{
        fs::{Fs, FsError},
        net::{Net, NetError},
    },
    cfg::config::Config,
    proto::{
        command::{Command, Verb, parse},
        reply::ReplyWriter,
    },
    server::{
        pasv::{Pasv, PasvPhase},
        session::{AuthPhase, Session, TransferType},
    },
    transfer::{list::ListTransfer, retr::RetrTransfer, stor::StorTransfer},
    utils::ct_eq,
};

pub(crate) struct Engine<N: Net, F: Fs> {
    pub(crate) cfg: Config,
    pub(crate) net: N,
    pub(crate) fs: F,
    pub(crate) listener: N::ControlListener,
    pub(crate) control: Option<N::Conn>,
    pub(crate) reply: ReplyWriter,
    pub(crate) session: Session<F>,
    pub(crate) pasv: Pasv<N>,
    pub(crate) list: ListTransfer<F>,
    pub(crate) retr: RetrTransfer<F>,
    pub(crate) stor: StorTransfer<F>,
    pub(crate) transfer_buf: Box<[u8]>,
    pub(crate) scratch: Box<[u8]>,
    pub(crate) ctrl_last_ms: u64,
    pub(crate) pasv_last_ms: u64,
    pub(crate) xfer_last_ms: u64,
}

impl<N: Net, F: Fs> Engine<N, F> {
    /// One control-accept attempt. A connection arriving while a session is
    /// live gets a best-effort `421` and is closed without disturbing the
    /// active session.
    pub(crate) fn accept_control(&mut self, now: u64) {
        match self.net.accept_control(&mut self.listener) {
            Ok((mut conn, peer)) => {
                if self.control.is_some() {
                    info!(%peer, "rejecting second control connection");
                    let _ = self.net.write(&mut conn, b"421 Too many users\r\n");
                    self.net.close_conn(conn);
                } else {
                    info!(%peer, "control connection accepted");
                    self.control = Some(conn);
                    self.session.reset();
                    self.ctrl_last_ms = now;
                    self.reply
                        .post_fmt(220, format_args!("{}", self.cfg.server.banner));
                }
            }
            Err(NetError::WouldBlock) => {}
            Err(err) => debug!(?err, "control accept failed"),
        }
    }

    /// Drains pending reply bytes. An unrecoverable control-channel error
    /// tears the session down silently.
    pub(crate) fn flush_reply(&mut self, now: u64) {
        if !self.reply.is_pending() {
            return;
        }
        let Some(conn) = self.control.as_mut() else {
            return;
        };
        match self.reply.flush(&mut self.net, conn) {
            Ok(true) => self.ctrl_last_ms = now,
            Ok(false) => {}
            Err(err) => {
                debug!(?err, "control write failed");
                self.teardown_session();
            }
        }
    }

    pub(crate) fn poll_pasv(&mut self, now: u64) {
        if self.pasv.poll_accept(&mut self.net) {
            self.pasv_last_ms = now;
        }
    }

    pub(crate) fn drive_transfers(&mut self, now: u64) {
        let mut progress = false;
        self.list.advance(
            &mut self.net,
            &mut self.fs,
            &mut self.pasv,
            &mut self.reply,
            &mut self.transfer_buf,
            &mut progress,
        );
        self.retr.advance(
            &mut self.net,
            &mut self.fs,
            &mut self.pasv,
            &mut self.reply,
            &mut self.transfer_buf,
            &mut progress,
        );
        self.stor.advance(
            &mut self.net,
            &mut self.fs,
            &mut self.pasv,
            &mut self.reply,
            &mut self.transfer_buf,
            &mut progress,
        );
        if progress {
            self.xfer_last_ms = now;
        }
    }

    /// A command line may only be read when nothing else is in flight.
    pub(crate) fn ready_for_command(&self) -> bool {
        self.control.is_some()
            && !self.reply.is_pending()
            && self.session.auth != AuthPhase::Closing
            && self.list.is_idle()
            && self.retr.is_idle()
            && self.stor.is_idle()
    }

    pub(crate) fn teardown_session(&mut self) {
        if let Some(conn) = self.control.take() {
            self.net.close_conn(conn);
        }
        self.pasv.close_all(&mut self.net);
        self.list.release(&mut self.fs);
        self.retr.release(&mut self.fs);
        self.stor.release(&mut self.fs);
        self.session.reset();
        self.reply.clear();
        debug!("session closed");
    }

    pub(crate) fn check_timeouts(&mut self, now: u64) {
        if self.control.is_none() {
            return;
        }

        if let Some(limit) = self.cfg.timeouts.transfer_idle_ms
            && self.transfer_streaming()
            && now.saturating_sub(self.xfer_last_ms) >= limit
        {
            warn!("transfer idle timeout");
            self.abort_transfers(426, "Connection closed; transfer aborted");
        }

        if let Some(limit) = self.cfg.timeouts.pasv_idle_ms
            && matches!(
                self.pasv.phase,
                PasvPhase::Listening | PasvPhase::DataConnected
            )
            && now.saturating_sub(self.pasv_last_ms) >= limit
        {
            warn!("passive listener idle timeout");
            if self.transfer_waiting() {
                self.abort_transfers(425, "Can't open data connection");
            } else {
                self.pasv.close_all(&mut self.net);
            }
        }

        if let Some(limit) = self.cfg.timeouts.control_idle_ms
            && now.saturating_sub(self.ctrl_last_ms) >= limit
        {
            warn!("control idle timeout");
            if let Some(conn) = self.control.as_mut() {
                let _ = self.net.write(conn, b"421 Timeout\r\n");
            }
            self.teardown_session();
        }
    }

    fn transfer_streaming(&self) -> bool {
        self.list.is_streaming() || self.retr.is_streaming() || self.stor.is_streaming()
    }

    fn transfer_waiting(&self) -> bool {
        self.list.is_waiting() || self.retr.is_waiting() || self.stor.is_waiting()
    }

    /// At most one record is non-idle; releasing all three is the simplest
    /// way to hit it.
    fn abort_transfers(&mut self, code: u16, text: &str) {
        self.list.release(&mut self.fs);
        self.retr.release(&mut self.fs);
        self.stor.release(&mut self.fs);
        self.pasv.close_all(&mut self.net);
        self.reply.post(code, text);
    }

    // ─── command dispatch ────────────────────────────────────────────────

    pub(crate) fn handle_line(&mut self, line: &[u8], now: u64) {
        self.ctrl_last_ms = now;
        let cmd = parse(line);
        debug!(verb = ?cmd.verb, arg_len = cmd.arg.len(), "dispatch");

        // QUIT is honoured in every phase, pending rename included.
        if cmd.verb == Verb::Quit {
            self.session.auth = AuthPhase::Closing;
            self.reply.post(221, "Bye");
            return;
        }

        match self.session.auth {
            AuthPhase::NeedUser => match cmd.verb {
                Verb::User => self.cmd_user(cmd.arg),
                _ => self.reply.post(530, "Not logged in"),
            },
            AuthPhase::NeedPass => match cmd.verb {
                // USER re-enters the handshake without consuming a PASS
                // attempt.
                Verb::User => self.cmd_user(cmd.arg),
                Verb::Pass => self.cmd_pass(cmd.arg),
                _ => self.reply.post(530, "Not logged in"),
            },
            AuthPhase::Authed => self.dispatch_authed(cmd, now),
            AuthPhase::Closing => {}
        }
    }

    fn dispatch_authed(&mut self, cmd: Command<'_>, now: u64) {
        if self.session.rename_from.is_set() && cmd.verb != Verb::Rnto {
            self.reply.post(503, "RNFR requires RNTO");
            return;
        }
        match cmd.verb {
            Verb::Noop => self.reply.post(200, "OK"),
            Verb::Syst => self.reply.post(215, "UNIX Type: L8"),
            Verb::Type => self.cmd_type(cmd.arg),
            Verb::Feat => self.cmd_feat(),
            Verb::Pasv => self.cmd_pasv(now),
            Verb::List => self.cmd_list(cmd.arg),
            Verb::Retr => self.cmd_retr(cmd.arg),
            Verb::Stor => self.cmd_stor(cmd.arg),
            Verb::Pwd => self.cmd_pwd(),
            Verb::Cwd => self.cmd_cwd(cmd.arg),
            Verb::Cdup => self.cmd_cdup(),
            Verb::Dele => self.cmd_dele(cmd.arg),
            Verb::Rnfr => self.cmd_rnfr(cmd.arg),
            Verb::Rnto => self.cmd_rnto(cmd.arg),
            Verb::Mkd => self.cmd_mkd(cmd.arg),
            Verb::Rmd => self.cmd_rmd(cmd.arg),
            Verb::Size => self.cmd_size(cmd.arg),
            Verb::Mdtm => self.cmd_mdtm(cmd.arg),
            Verb::User => self.reply.post(530, "Can't change user"),
            Verb::Pass => self.reply.post(503, "Already logged in"),
            Verb::Quit => {}
            Verb::Unknown => self.reply.post(502, "Command not implemented"),
        }
    }

    fn cmd_user(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if arg == self.cfg.auth.username.as_bytes() {
            self.session.auth = AuthPhase::NeedPass;
            self.reply.post(331, "User name okay, need password");
        } else {
            self.session.auth = AuthPhase::NeedUser;
            self.reply.post(530, "Not logged in");
        }
    }

    fn cmd_pass(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !ct_eq(arg, self.cfg.auth.password.as_bytes()) {
            self.session.auth = AuthPhase::NeedUser;
            self.reply.post(530, "Not logged in");
            return;
        }
        match self.fs.cwd_init() {
            Ok(dir) => {
                self.session.cwd = Some(dir);
                self.session.auth = AuthPhase::Authed;
                info!("user authenticated");
                self.reply.post(230, "User logged in");
            }
            Err(err) => {
                self.session.auth = AuthPhase::NeedUser;
                self.reply.post_fs_error(err);
            }
        }
    }

    fn cmd_type(&mut self, arg: &[u8]) {
        if arg.eq_ignore_ascii_case(b"I") {
            self.session.ttype = TransferType::Binary;
            self.reply.post(200, "Type set to I");
        } else if arg.eq_ignore_ascii_case(b"A") {
            // Accepted for compatibility; transfers stay binary.
            self.session.ttype = TransferType::Ascii;
            self.reply.post(200, "Type set to A");
        } else {
            self.reply
                .post(504, "Command not implemented for that parameter");
        }
    }

    fn cmd_feat(&mut self) {
        let mut features: [&str; 4] = [""; 4];
        let mut n = 0;
        features[n] = "TYPE I";
        n += 1;
        features[n] = "PASV";
        n += 1;
        if F::SUPPORTS_SIZE {
            features[n] = "SIZE";
            n += 1;
        }
        if F::SUPPORTS_MDTM {
            features[n] = "MDTM";
            n += 1;
        }
        self.reply.post_feat(&features[..n]);
    }

    fn cmd_pasv(&mut self, now: u64) {
        let hint = Some(self.cfg.server.listen_address);
        let addr = match self.pasv.open(&mut self.net, hint) {
            Ok(addr) => addr,
            Err(err) => {
                debug!(?err, "passive listen failed");
                self.reply.post(425, "Can't open data connection");
                return;
            }
        };
        self.pasv_last_ms = now;
        let tuple_len = match N::format_pasv_addr(&addr, &mut self.scratch) {
            Ok(n) => n,
            Err(err) => {
                debug!(?err, "passive address not representable");
                self.pasv.close_all(&mut self.net);
                self.reply.post(425, "Can't open data connection");
                return;
            }
        };
        match str::from_utf8(&self.scratch[..tuple_len]) {
            Ok(tuple) => self
                .reply
                .post_fmt(227, format_args!("Entering Passive Mode ({tuple})")),
            Err(_) => {
                self.pasv.close_all(&mut self.net);
                self.reply.post_fs_error(FsError::Io);
            }
        }
    }

    /// Transfer commands need an armed passive listener first.
    fn transfer_gate(&mut self) -> bool {
        if self.pasv.phase == PasvPhase::Idle {
            self.reply.post(425, "Use PASV first");
            return false;
        }
        true
    }

    fn cmd_list(&mut self, arg: &[u8]) {
        if !self.transfer_gate() {
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        let path = if arg.is_empty() { None } else { Some(arg) };
        match self.fs.dir_open(cwd, path) {
            Ok(iter) => self.list.open(iter),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_retr(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !self.transfer_gate() {
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.open_read(cwd, arg) {
            Ok(file) => self.retr.open(file),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_stor(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !self.transfer_gate() {
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.open_write(cwd, arg) {
            Ok(file) => self.stor.open(file),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_pwd(&mut self) {
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.cwd_pwd(cwd, &mut self.scratch) {
            Ok(path) => self.reply.post_quoted(257, path),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_cwd(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        let Some(cwd) = self.session.cwd.as_mut() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.cwd_change(cwd, arg) {
            Ok(()) => self.reply.post(250, "Directory successfully changed"),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_cdup(&mut self) {
        let Some(cwd) = self.session.cwd.as_mut() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.cwd_up(cwd) {
            Ok(()) => self.reply.post(250, "Directory successfully changed"),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_dele(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.remove(cwd, arg) {
            Ok(()) => self.reply.post(250, "File deleted"),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_rnfr(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !self.session.rename_from.set(arg) {
            self.reply
                .post(553, "Requested action not taken. File name not allowed");
            return;
        }
        self.reply.post(350, "Ready for RNTO");
    }

    fn cmd_rnto(&mut self, arg: &[u8]) {
        if !self.session.rename_from.is_set() {
            self.reply.post(503, "RNFR required first");
            return;
        }
        if arg.is_empty() {
            // Syntax error, not a sequencing error: the pending name
            // survives.
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        let result = self
            .fs
            .rename(cwd, self.session.rename_from.as_slice(), arg);
        self.session.rename_from.clear();
        match result {
            Ok(()) => self.reply.post(250, "Rename successful"),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_mkd(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !F::SUPPORTS_MKD {
            self.reply.post(502, "Command not implemented");
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.make_dir(cwd, arg) {
            Ok(()) => self.reply.post_quoted(257, arg),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_rmd(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !F::SUPPORTS_RMD {
            self.reply.post(502, "Command not implemented");
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.remove_dir(cwd, arg) {
            Ok(()) => self.reply.post(250, "Directory removed"),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_size(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !F::SUPPORTS_SIZE {
            self.reply.post(502, "Command not implemented");
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.file_size(cwd, arg) {
            Ok(size) => self.reply.post_fmt(213, format_args!("{size}")),
            Err(err) => self.reply.post_fs_error(err),
        }
    }

    fn cmd_mdtm(&mut self, arg: &[u8]) {
        if arg.is_empty() {
            self.reply.post(501, "Syntax error in parameters");
            return;
        }
        if !F::SUPPORTS_MDTM {
            self.reply.post(502, "Command not implemented");
            return;
        }
        let Some(cwd) = self.session.cwd.as_ref() else {
            self.reply.post_fs_error(FsError::Io);
            return;
        };
        match self.fs.file_mtime(cwd, arg) {
            Ok(secs) if secs < 0 => self.reply.post_fs_error(FsError::Io),
            Ok(secs) => match chrono::DateTime::from_timestamp(secs, 0) {
                Some(ts) => self
                    .reply
                    .post_fmt(213, format_args!("{}", ts.format("%Y%m%d%H%M%S"))),
                None => self.reply.post_fs_error(FsError::Io),
            },
            Err(err) => self.reply.post_fs_error(err),
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TCP transport backed by mio's non-blocking sockets.
//!
//! Sockets are created non-blocking, so accepts, reads, and writes surface
//! `WouldBlock` instead of parking the tick loop. The driver owns the
//! pacing; no poll registry is required for a single-session server.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr},
};

use mio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::backend::net::{Net, NetError};

#[derive(Debug, Default)]
pub struct TcpNet;

impl TcpNet {
    pub fn new() -> Self {
        Self
    }
}

fn map_err(err: &io::Error) -> NetError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => NetError::WouldBlock,
        io::ErrorKind::TimedOut => NetError::Timeout,
        io::ErrorKind::AddrNotAvailable | io::ErrorKind::AddrInUse => {
            NetError::AddrUnavailable
        }
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected => NetError::Closed,
        _ => NetError::Io,
    }
}

impl Net for TcpNet {
    type Conn = TcpStream;
    type ControlListener = TcpListener;
    type DataListener = TcpListener;

    fn bind_control(&mut self, addr: SocketAddr) -> Result<TcpListener, NetError> {
        TcpListener::bind(addr).map_err(|e| map_err(&e))
    }

    fn accept_control(
        &mut self,
        listener: &mut TcpListener,
    ) -> Result<(TcpStream, SocketAddr), NetError> {
        let (stream, peer) = listener.accept().map_err(|e| map_err(&e))?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(?err, "set_nodelay failed");
        }
        Ok((stream, peer))
    }

    /// Binds the control interface with an ephemeral port, so every PASV
    /// advertises a fresh endpoint.
    fn pasv_listen(&mut self, hint: Option<SocketAddr>) -> Result<TcpListener, NetError> {
        let mut addr = hint.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        addr.set_port(0);
        TcpListener::bind(addr).map_err(|e| map_err(&e))
    }

    fn pasv_addr(&mut self, listener: &TcpListener) -> Result<SocketAddr, NetError> {
        listener.local_addr().map_err(|e| map_err(&e))
    }

    fn accept_data(&mut self, listener: &mut TcpListener) -> Result<TcpStream, NetError> {
        let (stream, peer) = listener.accept().map_err(|e| map_err(&e))?;
        debug!(%peer, "data connection accepted");
        if let Err(err) = stream.set_nodelay(true) {
            debug!(?err, "set_nodelay failed");
        }
        Ok(stream)
    }

    fn read(&mut self, conn: &mut TcpStream, buf: &mut [u8]) -> Result<usize, NetError> {
        conn.read(buf).map_err(|e| map_err(&e))
    }

    fn write(&mut self, conn: &mut TcpStream, buf: &[u8]) -> Result<usize, NetError> {
        conn.write(buf).map_err(|e| map_err(&e))
    }

    fn close_conn(&mut self, conn: TcpStream) {
        let _ = conn.shutdown(Shutdown::Both);
    }

    fn close_data_listener(&mut self, listener: TcpListener) {
        drop(listener);
    }
}

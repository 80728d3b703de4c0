// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Transport contract consumed by the protocol engine.
//!
//! Every operation is expected to be non-blocking: a call that cannot make
//! progress returns [`NetError::WouldBlock`] and the engine retries it on a
//! later tick. Short reads and writes are normal; the engine resumes from
//! the returned count.

use core::fmt::Write;
use std::net::SocketAddr;

use thiserror::Error;

use crate::utils::ByteCursor;

/// Failure modes the engine consumes from a transport backend.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// The operation cannot proceed without waiting. Retried next tick,
    /// never surfaced to the client.
    #[error("operation would block")]
    WouldBlock,
    /// The peer is gone; the owning resource must be torn down.
    #[error("connection closed")]
    Closed,
    #[error("operation timed out")]
    Timeout,
    #[error("address unavailable")]
    AddrUnavailable,
    #[error("transport i/o failure")]
    Io,
}

/// A transport backend: control listener, passive listener, and connection
/// handles plus the operations the engine drives them with.
///
/// A zero-length read or write that is not [`NetError::WouldBlock`] is
/// treated as a closed connection by the engine, so backends may surface
/// end-of-stream either way.
pub trait Net {
    type ControlListener;
    type DataListener;
    type Conn;

    /// Binds the listener control connections are accepted from.
    fn bind_control(
        &mut self,
        addr: SocketAddr,
    ) -> Result<Self::ControlListener, NetError>;

    /// Accepts one pending control connection without blocking.
    fn accept_control(
        &mut self,
        listener: &mut Self::ControlListener,
    ) -> Result<(Self::Conn, SocketAddr), NetError>;

    /// Opens a passive-mode listener. `hint` carries the control listener's
    /// local address so the backend can bind the same interface.
    fn pasv_listen(
        &mut self,
        hint: Option<SocketAddr>,
    ) -> Result<Self::DataListener, NetError>;

    /// Reports the local address a passive listener is bound to.
    fn pasv_addr(&mut self, listener: &Self::DataListener)
    -> Result<SocketAddr, NetError>;

    /// Accepts one pending data connection without blocking.
    fn accept_data(
        &mut self,
        listener: &mut Self::DataListener,
    ) -> Result<Self::Conn, NetError>;

    fn read(&mut self, conn: &mut Self::Conn, buf: &mut [u8])
    -> Result<usize, NetError>;

    /// Short writes are permitted; the caller resumes from the returned
    /// count.
    fn write(&mut self, conn: &mut Self::Conn, buf: &[u8]) -> Result<usize, NetError>;

    /// Closing is idempotent from the engine's point of view: the handle is
    /// consumed and never touched again.
    fn close_conn(&mut self, conn: Self::Conn);

    fn close_data_listener(&mut self, listener: Self::DataListener);

    /// Renders `addr` as the `h1,h2,h3,h4,p1,p2` tuple of the `227` reply,
    /// `p1` being the high port byte. Passive mode is IPv4 only, so an IPv6
    /// address is refused.
    fn format_pasv_addr(addr: &SocketAddr, out: &mut [u8]) -> Result<usize, NetError> {
        let SocketAddr::V4(v4) = addr else {
            return Err(NetError::AddrUnavailable);
        };
        let [h1, h2, h3, h4] = v4.ip().octets();
        let port = v4.port();
        let mut cur = ByteCursor::new(out);
        write!(cur, "{h1},{h2},{h3},{h4},{},{}", port >> 8, port & 0xff)
            .map_err(|_| NetError::Io)?;
        Ok(cur.pos())
    }
}

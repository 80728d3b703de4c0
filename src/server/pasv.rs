// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;

use tracing::debug;

use crate::backend::net::{Net, NetError};

/// Passive-mode lifecycle. `Idle` holds no listener and no data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasvPhase {
    Idle,
    Listening,
    DataConnected,
    Transferring,
}

pub struct Pasv<N: Net> {
    pub phase: PasvPhase,
    listener: Option<N::DataListener>,
    conn: Option<N::Conn>,
}

impl<N: Net> Pasv<N> {
    pub fn new() -> Self {
        Self { phase: PasvPhase::Idle, listener: None, conn: None }
    }

    pub fn has_conn(&self) -> bool {
        self.conn.is_some()
    }

    pub fn conn_mut(&mut self) -> Option<&mut N::Conn> {
        self.conn.as_mut()
    }

    /// Opens a fresh passive listener, tearing down whatever was open, and
    /// returns the address to advertise in the `227` reply.
    pub fn open(
        &mut self,
        net: &mut N,
        hint: Option<SocketAddr>,
    ) -> Result<SocketAddr, NetError> {
        self.close_all(net);
        let listener = net.pasv_listen(hint)?;
        match net.pasv_addr(&listener) {
            Ok(addr) => {
                debug!(%addr, "passive listener open");
                self.listener = Some(listener);
                self.phase = PasvPhase::Listening;
                Ok(addr)
            }
            Err(err) => {
                net.close_data_listener(listener);
                Err(err)
            }
        }
    }

    /// One data-connection accept attempt per tick. Would-block leaves the
    /// phase unchanged; returns true when a connection was just accepted.
    pub fn poll_accept(&mut self, net: &mut N) -> bool {
        if self.phase != PasvPhase::Listening || self.conn.is_some() {
            return false;
        }
        let Some(listener) = self.listener.as_mut() else {
            return false;
        };
        match net.accept_data(listener) {
            Ok(conn) => {
                debug!("data connection accepted");
                self.conn = Some(conn);
                self.phase = PasvPhase::DataConnected;
                true
            }
            Err(NetError::WouldBlock) => false,
            Err(err) => {
                debug!(?err, "data accept failed");
                false
            }
        }
    }

    /// Closes the data connection and the listener and returns to `Idle`.
    /// Safe to call at any time.
    pub fn close_all(&mut self, net: &mut N) {
        if let Some(conn) = self.conn.take() {
            net.close_conn(conn);
        }
        if let Some(listener) = self.listener.take() {
            net.close_data_listener(listener);
        }
        self.phase = PasvPhase::Idle;
    }
}

impl<N: Net> Default for Pasv<N> {
    fn default() -> Self {
        Self::new()
    }
}

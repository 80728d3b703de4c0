// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{backend::fs::Fs, cfg::config::PATH_MAX};

/// Where the login handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    NeedUser,
    NeedPass,
    Authed,
    /// QUIT accepted; the session closes once the `221` has been flushed.
    Closing,
}

/// Representation requested via TYPE. Transfers are always binary; ASCII is
/// accepted for client compatibility and treated the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Binary,
    Ascii,
}

/// Bounded staging for the path named by RNFR until an RNTO consumes it.
pub struct PendingRename {
    buf: [u8; PATH_MAX],
    len: usize,
}

impl PendingRename {
    fn new() -> Self {
        Self { buf: [0; PATH_MAX], len: 0 }
    }

    pub fn is_set(&self) -> bool {
        self.len > 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// False when the path does not fit.
    pub fn set(&mut self, path: &[u8]) -> bool {
        if path.is_empty() || path.len() > PATH_MAX {
            return false;
        }
        self.buf[..path.len()].copy_from_slice(path);
        self.len = path.len();
        true
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Per-connection protocol state. Created on control accept, reset on
/// control close; only the driver mutates it.
pub struct Session<F: Fs> {
    pub auth: AuthPhase,
    pub ttype: TransferType,
    /// `Some` once authentication acquired a working-directory handle.
    pub cwd: Option<F::Dir>,
    pub rename_from: PendingRename,
}

impl<F: Fs> Session<F> {
    pub fn new() -> Self {
        Self {
            auth: AuthPhase::NeedUser,
            ttype: TransferType::Binary,
            cwd: None,
            rename_from: PendingRename::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<F: Fs> Default for Session<F> {
    fn default() -> Self {
        Self::new()
    }
}

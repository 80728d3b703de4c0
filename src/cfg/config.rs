// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, net::SocketAddr, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Longest path the session will hold for a pending rename.
pub const PATH_MAX: usize = 512;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Listener, sandbox root, and greeting.
    pub server: ServerConfig,
    /// The single credential pair the session accepts.
    pub auth: AuthConfig,
    /// Fixed buffer sizes, allocated once at startup.
    #[serde(default)]
    pub limits: Limits,
    /// Optional idle timeouts; an absent value means the scope has none.
    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(rename = "ListenAddress")]
    /// Address the control listener binds; also the bind hint for passive
    /// listeners.
    pub listen_address: SocketAddr,

    #[serde(default = "default_root", rename = "RootDir")]
    /// Directory the filesystem backend is sandboxed to.
    pub root_dir: String,

    #[serde(default = "default_banner", rename = "Banner")]
    /// Text of the initial `220` reply.
    pub banner: String,
}

/// Credentials compared byte-for-byte; the password check is constant-time.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AuthConfig {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Password")]
    pub password: String,
}

/// Fixed sizes for the command, reply, transfer, and scratch buffers.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Limits {
    #[serde(default = "default_command_max", rename = "CommandMax")]
    pub command_max: usize,
    #[serde(default = "default_reply_max", rename = "ReplyMax")]
    pub reply_max: usize,
    #[serde(default = "default_transfer_max", rename = "TransferMax")]
    pub transfer_max: usize,
    #[serde(default = "default_scratch_max", rename = "ScratchMax")]
    pub scratch_max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            command_max: default_command_max(),
            reply_max: default_reply_max(),
            transfer_max: default_transfer_max(),
            scratch_max: default_scratch_max(),
        }
    }
}

/// Idle thresholds in milliseconds, compared against the `now_ms` counter
/// passed to `tick`.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Timeouts {
    #[serde(default, rename = "ControlIdleMs")]
    pub control_idle_ms: Option<u64>,
    #[serde(default, rename = "PasvIdleMs")]
    pub pasv_idle_ms: Option<u64>,
    #[serde(default, rename = "TransferIdleMs")]
    pub transfer_idle_ms: Option<u64>,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Minimal in-code configuration for embedding the engine without a
    /// config file.
    pub fn for_embedding(listen: SocketAddr, username: &str, password: &str) -> Self {
        Self {
            server: ServerConfig {
                listen_address: listen,
                root_dir: default_root(),
                banner: default_banner(),
            },
            auth: AuthConfig {
                username: username.to_string(),
                password: password.to_string(),
            },
            limits: Limits::default(),
            timeouts: Timeouts::default(),
        }
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.auth.username.is_empty(), "Username must not be empty");
        ensure!(!self.auth.password.is_empty(), "Password must not be empty");

        if self.server.banner.is_empty() {
            self.server.banner = default_banner();
        }

        // Floors keep the engine's framing assumptions valid: a reply or
        // command line always fits its buffer with room for CRLF.
        ensure!(self.limits.command_max >= 1024, "CommandMax must be >= 1024");
        ensure!(self.limits.reply_max >= 1024, "ReplyMax must be >= 1024");
        ensure!(
            self.limits.transfer_max >= 4096,
            "TransferMax must be >= 4096"
        );
        ensure!(self.limits.scratch_max >= 1024, "ScratchMax must be >= 1024");

        Ok(())
    }
}

fn default_root() -> String {
    ".".to_string()
}

fn default_banner() -> String {
    "FTP Server Ready".to_string()
}

fn default_command_max() -> usize {
    1024
}

fn default_reply_max() -> usize {
    1024
}

fn default_transfer_max() -> usize {
    8192
}

fn default_scratch_max() -> usize {
    1024
}

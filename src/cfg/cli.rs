// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Configuration file named on the command line, or `config.yaml` in the
/// working directory when the server is started bare.
pub fn config_path_from_args() -> String {
    path_or_default(env::args().nth(1))
}

fn path_or_default(arg: Option<String>) -> String {
    arg.unwrap_or_else(|| "config.yaml".to_string())
}

/// Resolves a config path to its canonical absolute form, so log lines and
/// error messages name the real file no matter where the server was
/// launched from.
pub fn resolve_config_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("cannot get current working dir")?
            .join(path)
    };
    abs.canonicalize()
        .with_context(|| format!("config file {} not found", abs.display()))
}

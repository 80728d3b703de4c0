// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use ftp_server_rs::{
    cfg::{
        cli::{config_path_from_args, resolve_config_path},
        config::Config,
        logger::init_logger,
    },
    server::FtpServer,
    transport::tcp::TcpNet,
    vfs::rooted::RootedFs,
};
use tracing::info;

fn main() -> Result<()> {
    let cfg_path = resolve_config_path(&config_path_from_args())?;
    let cfg = Config::load_from_file(&cfg_path)
        .with_context(|| format!("failed to load config {cfg_path:?}"))?;

    let _logger_guard = init_logger(&cfg_path.to_string_lossy())?;

    let fsx = RootedFs::new(&cfg.server.root_dir)
        .with_context(|| format!("root dir {:?} unusable", cfg.server.root_dir))?;
    let addr = cfg.server.listen_address;

    let mut server =
        FtpServer::new(TcpNet::new(), fsx, cfg).context("failed to bind")?;
    info!(%addr, "listening");

    let start = Instant::now();
    loop {
        server.tick(start.elapsed().as_millis() as u64);
        thread::sleep(Duration::from_millis(1));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Randomised-schedule and ordering properties.

use rand::RngExt;

use crate::support::{
    harness::Harness,
    mock_fs::MemFs,
    mock_net::{ReadStep, WriteStep},
};

/// Bytes on the data channel are never lost or duplicated, whatever the
/// write schedule looks like.
#[test]
fn test_retr_survives_random_write_schedules() {
    let mut rng = rand::rng();

    for _ in 0..20 {
        let len = rng.random_range(1..2000);
        let mut payload = vec![0u8; len];
        rng.fill(payload.as_mut_slice());

        let fs = MemFs::new();
        fs.add_file("/blob.bin", &payload);
        let mut h = Harness::with_fs(fs);
        let (_listener, data) = h.arm_pasv();
        for _ in 0..rng.random_range(0..64) {
            if rng.random_range(0..3) == 0 {
                data.push_write_step(WriteStep::WouldBlock);
            } else {
                data.push_write_step(WriteStep::Take(rng.random_range(1..9)));
            }
        }

        h.line("USER test");
        h.line("PASS secret");
        h.line("PASV");
        h.line("RETR blob.bin");
        h.ticks(600);

        assert_eq!(data.output(), payload);
        let lines = h.reply_lines();
        assert_eq!(lines[lines.len() - 1], "226 Closing data connection");
    }
}

/// The captured upload equals the concatenation of whatever the client
/// sent, across arbitrary read chunking and short file writes.
#[test]
fn test_stor_survives_random_schedules() {
    let mut rng = rand::rng();

    for _ in 0..20 {
        let len = rng.random_range(1..2000);
        let mut payload = vec![0u8; len];
        rng.fill(payload.as_mut_slice());

        let mut fs = MemFs::new();
        fs.write_cap = Some(rng.random_range(1..8));
        let mut h = Harness::with_fs(fs);
        let (_listener, data) = h.arm_pasv();

        let mut sent = 0;
        while sent < payload.len() {
            if rng.random_range(0..4) == 0 {
                data.push_read(ReadStep::WouldBlock);
            }
            let chunk = rng.random_range(1..64).min(payload.len() - sent);
            data.push_read(ReadStep::Data(payload[sent..sent + chunk].to_vec()));
            sent += chunk;
        }
        data.push_read(ReadStep::Eof);

        h.line("USER test");
        h.line("PASS secret");
        h.line("PASV");
        h.line("STOR blob.bin");
        h.ticks(3000);

        assert_eq!(
            h.fs_state.borrow().files.get("/blob.bin").map(Vec::as_slice),
            Some(payload.as_slice())
        );
        let lines = h.reply_lines();
        assert_eq!(lines[lines.len() - 1], "226 Closing data connection");
    }
}

/// `150` precedes `226` and nothing else is emitted between them.
#[test]
fn test_transfer_replies_never_interleave() {
    let fs = MemFs::new();
    fs.add_dir("/docs");
    fs.add_file("/a.txt", b"aaa");
    fs.add_file("/b.txt", b"bbb");
    let mut h = Harness::with_fs(fs);
    let (_l, _d) = h.arm_pasv();

    h.line("USER test");
    h.line("PASS secret");
    h.line("PASV");
    h.line("LIST");
    // Queued behind the transfer: must not be answered before the 226.
    h.line("NOOP");
    h.ticks(60);

    let lines = h.reply_lines();
    let i150 = lines
        .iter()
        .position(|l| l.starts_with("150"))
        .expect("150 emitted");
    let i226 = lines
        .iter()
        .position(|l| l.starts_with("226"))
        .expect("226 emitted");
    assert_eq!(i226, i150 + 1);
    assert_eq!(lines[i226 + 1], "200 OK");
}

/// An overlong command line costs exactly one `500` and the session keeps
/// working afterwards.
#[test]
fn test_overlong_line_yields_single_500() {
    let mut h = Harness::new();
    let mut long = vec![b'A'; 5000];
    long.extend_from_slice(b"\r\n");
    h.control.push_read(ReadStep::Data(long));
    h.line("USER test");
    h.line("PASS secret");
    h.ticks(30);

    assert_eq!(h.reply_codes(), vec![220, 500, 331, 230]);
}

#[test]
fn test_control_idle_timeout_closes_session() {
    let mut cfg = crate::support::harness::test_config();
    cfg.timeouts.control_idle_ms = Some(100);
    let mut h = Harness::with_config_fs(cfg, MemFs::new());

    h.line("USER test");
    h.line("PASS secret");
    h.ticks(8);
    assert!(h.server.session_active());

    h.tick_at(10_000);
    assert!(!h.server.session_active());
    assert!(h.control.is_closed());
    assert!(h.output().ends_with("421 Timeout\r\n"));
}

#[test]
fn test_transfer_idle_timeout_aborts_with_426() {
    let mut cfg = crate::support::harness::test_config();
    cfg.timeouts.transfer_idle_ms = Some(100);
    let fs = MemFs::new();
    fs.add_file("/slow.bin", &[1u8; 256]);
    let mut h = Harness::with_config_fs(cfg, fs);
    let (_listener, data) = h.arm_pasv();
    // The client never drains its socket.
    for _ in 0..4000 {
        data.push_write_step(WriteStep::WouldBlock);
    }

    h.line("USER test");
    h.line("PASS secret");
    h.line("PASV");
    h.line("RETR slow.bin");
    h.ticks(8);

    for now in (100..4000).step_by(50) {
        h.tick_at(now);
    }

    let lines = h.reply_lines();
    assert_eq!(
        lines[lines.len() - 1],
        "426 Connection closed; transfer aborted"
    );
}

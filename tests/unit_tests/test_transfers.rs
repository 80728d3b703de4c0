// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Transfer gating, PASV lifecycle, and abort paths.

use ftp_server_rs::backend::fs::FsError;

use crate::support::{
    harness::{Harness, PASV_ADDR},
    mock_fs::MemFs,
    mock_net::{ReadStep, WriteStep},
};

#[test]
fn test_transfers_require_pasv_first() {
    let fs = MemFs::new();
    fs.add_file("/readme.txt", b"hi");
    let mut h = Harness::with_fs(fs);
    h.login();
    h.line("LIST");
    h.line("RETR readme.txt");
    h.line("STOR up.bin");
    h.ticks(10);

    assert_eq!(
        h.reply_lines()[3..],
        ["425 Use PASV first", "425 Use PASV first", "425 Use PASV first"]
    );
    // No stream was ever opened.
    let st = h.fs_state.borrow();
    assert_eq!(st.dir_opens, 0);
    assert_eq!(st.read_opens, 0);
    assert_eq!(st.write_opens, 0);
}

#[test]
fn test_pasv_reply_and_tuple() {
    let mut h = Harness::new();
    h.login();
    let (_listener, _data) = h.arm_pasv();
    h.line("PASV");
    h.ticks(6);

    assert_eq!(h.reply_lines()[3], PASV_ADDR);
}

#[test]
fn test_pasv_failure_is_425() {
    let mut h = Harness::new();
    h.login();
    // Nothing queued: pasv_listen fails.
    h.line("PASV");
    h.ticks(6);

    assert_eq!(h.reply_lines()[3], "425 Can't open data connection");
}

#[test]
fn test_repeated_pasv_closes_prior_resources() {
    let mut h = Harness::new();
    h.login();
    let (first_listener, first_data) = h.arm_pasv();
    let (second_listener, _second_data) = h.arm_pasv();

    h.line("PASV");
    h.ticks(4);
    h.line("PASV");
    h.ticks(4);
    h.line("QUIT");
    h.ticks(4);

    assert_eq!(
        h.reply_lines()[3..],
        [PASV_ADDR, PASV_ADDR, "221 Bye"]
    );
    // The first listener and its accepted data connection were closed
    // before the second 227 went out.
    assert!(first_listener.is_closed());
    assert!(first_data.is_closed());
    assert!(second_listener.is_closed()); // closed by QUIT teardown
}

#[test]
fn test_retr_open_failure_never_starts_transfer() {
    let mut h = Harness::new();
    h.login();
    let (_listener, data) = h.arm_pasv();
    h.line("PASV");
    h.line("RETR missing.txt");
    h.line("NOOP");
    h.ticks(10);

    assert_eq!(
        h.reply_lines()[4..],
        ["550 File not found", "200 OK"]
    );
    assert!(data.output().is_empty());
}

#[test]
fn test_stor_open_failure_maps_through_table() {
    let fs = MemFs::new();
    fs.fail_with("/full.bin", FsError::NoSpace);
    let mut h = Harness::with_fs(fs);
    h.login();
    let (_listener, _data) = h.arm_pasv();
    h.line("PASV");
    h.line("STOR full.bin");
    h.ticks(10);

    assert_eq!(h.reply_lines()[4], "452 Insufficient storage space");
}

#[test]
fn test_list_aborts_when_client_never_connects() {
    let mut cfg = crate::support::harness::test_config();
    cfg.timeouts.pasv_idle_ms = Some(50);
    let mut h = Harness::with_config_fs(cfg, MemFs::new());

    h.login();
    let listener = h.arm_pasv_no_peer();
    h.line("PASV");
    h.ticks(4);
    h.line("LIST");
    h.ticks(4);

    // Stream open, 150 withheld: nothing on the wire past the 227 yet.
    assert_eq!(h.fs_state.borrow().dir_opens, 1);
    assert_eq!(h.reply_lines().len(), 4);

    // Nobody ever connects; the passive idle timeout fires and the
    // waiting transfer aborts.
    h.tick_at(500);
    h.ticks(4);
    assert_eq!(h.reply_lines()[4], "425 Can't open data connection");
    assert!(listener.is_closed());
}

#[test]
fn test_retr_data_conn_closed_mid_stream_is_426() {
    let fs = MemFs::new();
    fs.add_file("/big.bin", &[7u8; 64]);
    let mut h = Harness::with_fs(fs);
    h.login();
    let (_listener, data) = h.arm_pasv();
    // Accept a little, then the client vanishes.
    data.push_write_step(WriteStep::Take(16));
    data.push_write_step(WriteStep::Closed);

    h.line("PASV");
    h.line("RETR big.bin");
    h.ticks(16);

    assert_eq!(
        h.reply_lines()[4..],
        [
            "150 Opening data connection",
            "426 Connection closed; transfer aborted",
        ]
    );
}

#[test]
fn test_stor_zero_byte_file_write_is_451() {
    let mut fs = MemFs::new();
    fs.write_cap = Some(0);
    let mut h = Harness::with_fs(fs);
    h.login();
    let (_listener, data) = h.arm_pasv();
    data.push_read(ReadStep::Data(b"payload".to_vec()));
    data.push_read(ReadStep::Eof);

    h.line("PASV");
    h.line("STOR up.bin");
    h.ticks(16);

    assert_eq!(
        h.reply_lines()[4..],
        [
            "150 Opening data connection",
            "451 Requested action aborted: local error in processing",
        ]
    );
}

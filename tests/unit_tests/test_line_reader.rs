// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use ftp_server_rs::{
    backend::net::NetError,
    proto::line::{LineEvent, LineReader},
};

use crate::support::mock_net::{MockConn, MockNet, ReadStep};

fn setup() -> (MockNet, MockConn, LineReader) {
    (MockNet::new(), MockConn::new(), LineReader::new(64))
}

#[test]
fn test_single_line() {
    let (mut net, mut conn, mut reader) = setup();
    conn.push_read(ReadStep::Data(b"USER test\r\n".to_vec()));

    let ev = reader.poll(&mut net, &mut conn).expect("poll");
    assert_eq!(ev, LineEvent::Line(b"USER test".as_slice()));

    let ev = reader.poll(&mut net, &mut conn).expect("poll");
    assert_eq!(ev, LineEvent::Pending);
}

#[test]
fn test_line_split_across_reads() {
    let (mut net, mut conn, mut reader) = setup();
    conn.push_read(ReadStep::Data(b"US".to_vec()));
    conn.push_read(ReadStep::WouldBlock);
    conn.push_read(ReadStep::Data(b"ER a\r".to_vec()));
    conn.push_read(ReadStep::Data(b"\n".to_vec()));

    assert_eq!(reader.poll(&mut net, &mut conn).expect("poll"), LineEvent::Pending);
    assert_eq!(reader.poll(&mut net, &mut conn).expect("poll"), LineEvent::Pending);
    assert_eq!(reader.poll(&mut net, &mut conn).expect("poll"), LineEvent::Pending);
    let ev = reader.poll(&mut net, &mut conn).expect("poll");
    assert_eq!(ev, LineEvent::Line(b"USER a".as_slice()));
}

#[test]
fn test_two_buffered_lines_come_out_of_successive_polls() {
    let (mut net, mut conn, mut reader) = setup();
    conn.push_read(ReadStep::Data(b"NOOP\r\nSYST\r\n".to_vec()));

    let ev = reader.poll(&mut net, &mut conn).expect("poll");
    assert_eq!(ev, LineEvent::Line(b"NOOP".as_slice()));
    // Second line is already staged; no further transport read is needed.
    let ev = reader.poll(&mut net, &mut conn).expect("poll");
    assert_eq!(ev, LineEvent::Line(b"SYST".as_slice()));
    assert_eq!(reader.poll(&mut net, &mut conn).expect("poll"), LineEvent::Pending);
}

#[test]
fn test_overlong_line_discarded_through_crlf() {
    let (mut net, mut conn, mut reader) = setup();
    // 100 bytes of junk against a 64-byte buffer, then a sane command.
    let mut long = vec![b'A'; 100];
    long.extend_from_slice(b"\r\n");
    conn.push_read(ReadStep::Data(long));
    conn.push_read(ReadStep::Data(b"NOOP\r\n".to_vec()));

    let mut saw_too_long = false;
    for _ in 0..10 {
        match reader.poll(&mut net, &mut conn).expect("poll") {
            LineEvent::TooLong => {
                saw_too_long = true;
                break;
            }
            LineEvent::Pending => {}
            LineEvent::Line(l) => panic!("unexpected line {l:?}"),
        }
    }
    assert!(saw_too_long);

    let mut saw_line = false;
    for _ in 0..10 {
        match reader.poll(&mut net, &mut conn).expect("poll") {
            LineEvent::Line(l) => {
                assert_eq!(l, b"NOOP");
                saw_line = true;
                break;
            }
            LineEvent::Pending => {}
            LineEvent::TooLong => panic!("second too-long"),
        }
    }
    assert!(saw_line);
}

#[test]
fn test_overlong_line_with_split_crlf() {
    let (mut net, mut conn, mut reader) = setup();
    // The terminator straddles the buffer boundary: 63 bytes + '\r', then
    // '\n' in the next read.
    let mut long = vec![b'B'; 63];
    long.push(b'\r');
    conn.push_read(ReadStep::Data(long));
    conn.push_read(ReadStep::Data(b"\n".to_vec()));
    conn.push_read(ReadStep::Data(b"SYST\r\n".to_vec()));

    let mut events = Vec::new();
    for _ in 0..10 {
        match reader.poll(&mut net, &mut conn).expect("poll") {
            LineEvent::TooLong => events.push("too-long".to_string()),
            LineEvent::Line(l) => {
                events.push(String::from_utf8_lossy(l).into_owned());
                break;
            }
            LineEvent::Pending => {}
        }
    }
    assert_eq!(events, vec!["too-long".to_string(), "SYST".to_string()]);
}

#[test]
fn test_closed_connection_surfaces() {
    let (mut net, mut conn, mut reader) = setup();
    conn.push_read(ReadStep::Eof);
    assert_eq!(reader.poll(&mut net, &mut conn), Err(NetError::Closed));

    let (mut net, mut conn, mut reader) = setup();
    conn.push_read(ReadStep::Closed);
    assert_eq!(reader.poll(&mut net, &mut conn), Err(NetError::Closed));
}

#[test]
fn test_line_never_exceeds_buffer_minus_crlf() {
    let (mut net, mut conn, mut reader) = setup();
    // Exactly fits: 62 bytes + CRLF in a 64-byte buffer.
    let mut line = vec![b'C'; 62];
    line.extend_from_slice(b"\r\n");
    conn.push_read(ReadStep::Data(line));

    let mut got = None;
    for _ in 0..5 {
        if let LineEvent::Line(l) = reader.poll(&mut net, &mut conn).expect("poll") {
            got = Some(l.len());
            break;
        }
    }
    assert_eq!(got, Some(62));
}

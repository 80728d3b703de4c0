// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use ftp_server_rs::proto::command::{Verb, parse};

#[test]
fn test_verbs_case_insensitive() {
    assert_eq!(parse(b"USER test").verb, Verb::User);
    assert_eq!(parse(b"user test").verb, Verb::User);
    assert_eq!(parse(b"UsEr test").verb, Verb::User);
    assert_eq!(parse(b"quit").verb, Verb::Quit);
    assert_eq!(parse(b"PaSv").verb, Verb::Pasv);
    assert_eq!(parse(b"mdtm x").verb, Verb::Mdtm);
}

#[test]
fn test_argument_is_verbatim() {
    let cmd = parse(b"RETR some file.txt");
    assert_eq!(cmd.verb, Verb::Retr);
    assert_eq!(cmd.arg, b"some file.txt");

    // Inner bytes are preserved, only outer spaces are trimmed.
    let cmd = parse(b"  STOR   weird\xffname  ");
    assert_eq!(cmd.verb, Verb::Stor);
    assert_eq!(cmd.arg, b"weird\xffname");
}

#[test]
fn test_no_argument() {
    let cmd = parse(b"NOOP");
    assert_eq!(cmd.verb, Verb::Noop);
    assert!(cmd.arg.is_empty());

    let cmd = parse(b"  SYST  ");
    assert_eq!(cmd.verb, Verb::Syst);
    assert!(cmd.arg.is_empty());
}

#[test]
fn test_unknown_verbs() {
    assert_eq!(parse(b"").verb, Verb::Unknown);
    assert_eq!(parse(b"   ").verb, Verb::Unknown);
    assert_eq!(parse(b"PORT 1,2,3,4,5,6").verb, Verb::Unknown);
    assert_eq!(parse(b"EPSV").verb, Verb::Unknown);
    assert_eq!(parse(b"REST 100").verb, Verb::Unknown);
    assert_eq!(parse(b"ABOR").verb, Verb::Unknown);
    assert_eq!(parse(b"USERX").verb, Verb::Unknown);
}

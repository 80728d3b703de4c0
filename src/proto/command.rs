// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tokenises one CRLF-stripped control line into a verb and its argument.
//!
//! Verbs are matched ASCII-case-insensitively. The argument is handed back
//! as the raw byte tail so path arguments reach the filesystem backend
//! exactly as the client sent them.

/// Verbs the dispatcher recognises. Anything else parses as `Unknown` and
/// is answered `502`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    User,
    Pass,
    Quit,
    Noop,
    Syst,
    Type,
    Feat,
    Pasv,
    List,
    Retr,
    Stor,
    Pwd,
    Cwd,
    Cdup,
    Dele,
    Rnfr,
    Rnto,
    Mkd,
    Rmd,
    Size,
    Mdtm,
    Unknown,
}

/// One parsed control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub verb: Verb,
    pub arg: &'a [u8],
}

const VERBS: &[(&[u8], Verb)] = &[
    (b"USER", Verb::User),
    (b"PASS", Verb::Pass),
    (b"QUIT", Verb::Quit),
    (b"NOOP", Verb::Noop),
    (b"SYST", Verb::Syst),
    (b"TYPE", Verb::Type),
    (b"FEAT", Verb::Feat),
    (b"PASV", Verb::Pasv),
    (b"LIST", Verb::List),
    (b"RETR", Verb::Retr),
    (b"STOR", Verb::Stor),
    (b"PWD", Verb::Pwd),
    (b"CWD", Verb::Cwd),
    (b"CDUP", Verb::Cdup),
    (b"DELE", Verb::Dele),
    (b"RNFR", Verb::Rnfr),
    (b"RNTO", Verb::Rnto),
    (b"MKD", Verb::Mkd),
    (b"RMD", Verb::Rmd),
    (b"SIZE", Verb::Size),
    (b"MDTM", Verb::Mdtm),
];

fn trim_spaces(mut s: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' '] = s {
        s = rest;
    }
    s
}

fn lookup(verb: &[u8]) -> Verb {
    for (name, v) in VERBS {
        if verb.eq_ignore_ascii_case(name) {
            return *v;
        }
    }
    Verb::Unknown
}

/// Splits a line at the first space: head is the verb, the trimmed tail is
/// the argument.
pub fn parse(line: &[u8]) -> Command<'_> {
    let line = trim_spaces(line);
    if line.is_empty() {
        return Command { verb: Verb::Unknown, arg: b"" };
    }
    match line.iter().position(|&b| b == b' ') {
        Some(i) => Command {
            verb: lookup(&line[..i]),
            arg: trim_spaces(&line[i + 1..]),
        },
        None => Command { verb: lookup(line), arg: &line[..0] },
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    cell::RefCell,
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::Rc,
};

use ftp_server_rs::backend::net::{Net, NetError};

/// One scripted inbound step for a mock connection.
#[derive(Debug, Clone)]
pub enum ReadStep {
    Data(Vec<u8>),
    WouldBlock,
    /// `read` returns Ok(0).
    Eof,
    /// `read` returns Err(Closed).
    Closed,
}

/// One scripted outbound step. An exhausted plan accepts everything.
#[derive(Debug, Clone, Copy)]
pub enum WriteStep {
    /// Accept at most this many bytes.
    Take(usize),
    WouldBlock,
    /// `write` returns Ok(0).
    Zero,
    /// `write` returns Err(Closed).
    Closed,
}

#[derive(Default)]
pub struct ConnScript {
    pub rx: VecDeque<ReadStep>,
    pub write_plan: VecDeque<WriteStep>,
    pub tx: Vec<u8>,
    pub closed: bool,
}

/// A connection handle; clones share the same script and capture.
#[derive(Clone, Default)]
pub struct MockConn {
    pub script: Rc<RefCell<ConnScript>>,
}

impl MockConn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one CRLF-terminated command line.
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend_from_slice(b"\r\n");
        self.script.borrow_mut().rx.push_back(ReadStep::Data(bytes));
    }

    pub fn push_read(&self, step: ReadStep) {
        self.script.borrow_mut().rx.push_back(step);
    }

    pub fn push_write_step(&self, step: WriteStep) {
        self.script.borrow_mut().write_plan.push_back(step);
    }

    pub fn output(&self) -> Vec<u8> {
        self.script.borrow().tx.clone()
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.script.borrow().tx).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.script.borrow().closed
    }
}

/// A listener handle; also used for the passive side.
#[derive(Clone, Default)]
pub struct MockListener {
    pub pending: Rc<RefCell<VecDeque<MockConn>>>,
    pub closed: Rc<RefCell<bool>>,
    pub addr: Rc<RefCell<Option<SocketAddr>>>,
}

impl MockListener {
    pub fn with_addr(addr: SocketAddr) -> Self {
        let l = Self::default();
        *l.addr.borrow_mut() = Some(addr);
        l
    }

    pub fn push_conn(&self, conn: &MockConn) {
        self.pending.borrow_mut().push_back(conn.clone());
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Scripted transport double. Passive listeners to hand out are queued in
/// advance; `pasv_listen` fails once the queue runs dry.
pub struct MockNet {
    pub control_listener: MockListener,
    pub pasv_queue: Rc<RefCell<VecDeque<MockListener>>>,
}

impl MockNet {
    pub fn new() -> Self {
        Self {
            control_listener: MockListener::default(),
            pasv_queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }
}

impl Net for MockNet {
    type Conn = MockConn;
    type ControlListener = MockListener;
    type DataListener = MockListener;

    fn bind_control(&mut self, _addr: SocketAddr) -> Result<MockListener, NetError> {
        Ok(self.control_listener.clone())
    }

    fn accept_control(
        &mut self,
        listener: &mut MockListener,
    ) -> Result<(MockConn, SocketAddr), NetError> {
        let conn = listener
            .pending
            .borrow_mut()
            .pop_front()
            .ok_or(NetError::WouldBlock)?;
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 49000);
        Ok((conn, peer))
    }

    fn pasv_listen(
        &mut self,
        _hint: Option<SocketAddr>,
    ) -> Result<MockListener, NetError> {
        self.pasv_queue
            .borrow_mut()
            .pop_front()
            .ok_or(NetError::AddrUnavailable)
    }

    fn pasv_addr(&mut self, listener: &MockListener) -> Result<SocketAddr, NetError> {
        listener.addr.borrow().ok_or(NetError::AddrUnavailable)
    }

    fn accept_data(&mut self, listener: &mut MockListener) -> Result<MockConn, NetError> {
        listener
            .pending
            .borrow_mut()
            .pop_front()
            .ok_or(NetError::WouldBlock)
    }

    fn read(&mut self, conn: &mut MockConn, buf: &mut [u8]) -> Result<usize, NetError> {
        let mut s = conn.script.borrow_mut();
        match s.rx.pop_front() {
            None | Some(ReadStep::WouldBlock) => Err(NetError::WouldBlock),
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::Closed) => Err(NetError::Closed),
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    s.rx.push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
        }
    }

    fn write(&mut self, conn: &mut MockConn, buf: &[u8]) -> Result<usize, NetError> {
        let mut s = conn.script.borrow_mut();
        match s.write_plan.pop_front() {
            None => {
                s.tx.extend_from_slice(buf);
                Ok(buf.len())
            }
            Some(WriteStep::Take(cap)) => {
                let n = cap.min(buf.len());
                s.tx.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            Some(WriteStep::WouldBlock) => Err(NetError::WouldBlock),
            Some(WriteStep::Zero) => Ok(0),
            Some(WriteStep::Closed) => Err(NetError::Closed),
        }
    }

    fn close_conn(&mut self, conn: MockConn) {
        conn.script.borrow_mut().closed = true;
    }

    fn close_data_listener(&mut self, listener: MockListener) {
        *listener.closed.borrow_mut() = true;
    }
}

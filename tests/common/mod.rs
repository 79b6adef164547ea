#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::TryInto;
use std::io::{Error, ErrorKind, Read, Write};
use std::rc::Rc;

use rfpsu_proto::{Connect, Frame, Psu, Revision, SerialConfig, FRAME_LEN};

/// Scripted serial endpoint shared between the test body and the port
/// handed to the driver. Responses are queued up front; everything the
/// driver transmits is recorded for inspection after the session closed.
pub struct MockSerial {
    rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub fail_connect: bool,
    pub fail_writes: bool,
    pub connect_count: usize,
}

impl MockSerial {
    pub fn new() -> Rc<RefCell<MockSerial>> {
        Rc::new(RefCell::new(MockSerial {
            rx: VecDeque::new(),
            tx: Vec::new(),
            fail_connect: false,
            fail_writes: false,
            connect_count: 0,
        }))
    }

    /// Queue a well-formed response frame.
    pub fn expect_reply(&mut self, revision: Revision, address: u8, command: u8, data: u16) {
        self.push_bytes(&Frame::new(revision, address, command, data).to_bytes());
    }

    /// Queue raw octets, corrupt or short frames included.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Everything transmitted so far, split into frames.
    pub fn tx_frames(&self) -> Vec<[u8; FRAME_LEN]> {
        self.tx
            .chunks(FRAME_LEN)
            .map(|chunk| chunk.try_into().expect("partial frame transmitted"))
            .collect()
    }
}

pub struct MockPort(Rc<RefCell<MockSerial>>);

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.rx.is_empty() {
            // A drained script behaves like a device that stopped talking.
            return Err(Error::new(ErrorKind::TimedOut, "mock response queue empty"));
        }
        let mut len = 0;
        while len < buf.len() {
            match inner.rx.pop_front() {
                Some(byte) => {
                    buf[len] = byte;
                    len += 1;
                }
                None => break,
            }
        }
        Ok(len)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.fail_writes {
            return Err(Error::new(ErrorKind::TimedOut, "mock write timeout"));
        }
        inner.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct MockConnector(pub Rc<RefCell<MockSerial>>);

impl Connect for MockConnector {
    type Port = MockPort;

    fn connect(&mut self, _config: &SerialConfig) -> std::io::Result<MockPort> {
        let mut inner = self.0.borrow_mut();
        inner.connect_count += 1;
        if inner.fail_connect {
            return Err(Error::new(ErrorKind::NotFound, "no such port"));
        }
        drop(inner);
        Ok(MockPort(Rc::clone(&self.0)))
    }
}

/// A driver wired to a fresh mock endpoint, plus the shared handle to it.
pub fn mock_psu(revision: Revision) -> (Psu<MockConnector>, Rc<RefCell<MockSerial>>) {
    let serial = MockSerial::new();
    let psu = Psu::with_connector(
        SerialConfig::new("MOCK0"),
        revision,
        MockConnector(Rc::clone(&serial)),
    );
    (psu, serial)
}

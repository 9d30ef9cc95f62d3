//! Scripted in-memory port shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;

/// One scripted event on the receive side.
#[derive(Debug)]
pub(crate) enum Rx {
    /// Bytes that become readable.
    Data(Vec<u8>),
    /// One read that times out with nothing received.
    Silence,
    /// Bytes left over from an earlier exchange; dropped by `clear_buffers`.
    Stale(Vec<u8>),
}

/// Mock serial port with separate read and write sides.
///
/// Every `write` call is recorded separately so tests can check how a frame
/// was split across writes. An exhausted script behaves like a silent line.
pub(crate) struct ScriptedPort {
    rx: VecDeque<Rx>,
    pub(crate) writes: Vec<Vec<u8>>,
    pub(crate) closed: bool,
    pub(crate) close_calls: usize,
    pub(crate) clear_calls: usize,
    timeout: Duration,
    accept_writes: bool,
}

impl ScriptedPort {
    pub(crate) fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            writes: Vec::new(),
            closed: false,
            close_calls: 0,
            clear_calls: 0,
            timeout: Duration::from_millis(1000),
            accept_writes: true,
        }
    }

    pub(crate) fn with_rx(mut self, bytes: &[u8]) -> Self {
        self.push_rx(bytes);
        self
    }

    pub(crate) fn with_silence(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.rx.push_back(Rx::Silence);
        }
        self
    }

    pub(crate) fn with_stale(mut self, bytes: &[u8]) -> Self {
        self.rx.push_back(Rx::Stale(bytes.to_vec()));
        self
    }

    pub(crate) fn rejecting_writes(mut self) -> Self {
        self.accept_writes = false;
        self
    }

    pub(crate) fn push_rx(&mut self, bytes: &[u8]) {
        self.rx.push_back(Rx::Data(bytes.to_vec()));
    }

    /// All written bytes, concatenated.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        match self.rx.pop_front() {
            Some(Rx::Data(mut data)) => {
                let n = take(buf, &mut data);
                if !data.is_empty() {
                    self.rx.push_front(Rx::Data(data));
                }
                Ok(n)
            },
            Some(Rx::Stale(mut data)) => {
                let n = take(buf, &mut data);
                if !data.is_empty() {
                    self.rx.push_front(Rx::Stale(data));
                }
                Ok(n)
            },
            Some(Rx::Silence) | None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
        }
    }
}

fn take(buf: &mut [u8], data: &mut Vec<u8>) -> usize {
    let n = buf.len().min(data.len());
    buf[..n].copy_from_slice(&data[..n]);
    data.drain(..n);
    n
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if !self.accept_writes {
            return Ok(0);
        }
        self.writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for ScriptedPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.rx
            .retain(|rx| !matches!(rx, Rx::Stale(_)));
        self.clear_calls += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.close_calls += 1;
        Ok(())
    }
}

//! Blocking byte transport over a [`Port`].
//!
//! The instrument link is half-duplex at the protocol level: every command is
//! written in full and then the answer is read back with a bounded wait. This
//! module provides the four primitives the protocol layers are written
//! against: `open`, `read(n)`, `write`, `close`.
//!
//! ## Read semantics
//!
//! `read(n)` returns as soon as `n` bytes arrived, when the total timeout
//! (`constant + per_byte * n`) elapses, or when the inter-byte interval
//! elapses after at least one byte arrived. A short result is therefore
//! possible and is returned as-is. A read that returns *nothing* is handled
//! by the [`TimeoutPolicy`].

use {
    crate::{
        error::{Error, Result},
        port::{LineTimeouts, Port},
    },
    log::trace,
    std::{io, time::Instant},
};

/// How zero-byte reads are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// The first empty read fails with [`Error::ReadTimeout`].
    #[default]
    Strict,
    /// Empty reads return an empty buffer until more than `max_consecutive`
    /// of them happened in a row. Used for connectivity probing, where
    /// silence is an expected answer.
    Tolerate {
        /// Number of consecutive empty reads accepted before failing.
        max_consecutive: u32,
    },
}

impl TimeoutPolicy {
    /// The tolerant policy used by connectivity probes (3 empty reads).
    pub const PROBE: Self = Self::Tolerate { max_consecutive: 3 };
}

/// Serial transport with bounded blocking reads and writes.
pub struct Transport<P: Port> {
    port: P,
    timeouts: LineTimeouts,
    policy: TimeoutPolicy,
    empty_reads: u32,
    closed: bool,
}

impl<P: Port> Transport<P> {
    /// Wrap an already opened port.
    pub fn new(port: P, timeouts: LineTimeouts) -> Self {
        Self {
            port,
            timeouts,
            policy: TimeoutPolicy::default(),
            empty_reads: 0,
            closed: false,
        }
    }

    /// Set the zero-byte read policy.
    #[must_use]
    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Change the zero-byte read policy of an open transport.
    pub fn set_policy(&mut self, policy: TimeoutPolicy) {
        self.policy = policy;
        self.empty_reads = 0;
    }

    /// Current zero-byte read policy.
    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    /// Line timeouts in effect.
    pub fn timeouts(&self) -> &LineTimeouts {
        &self.timeouts
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transport and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read up to `n` bytes, applying the [`TimeoutPolicy`] to empty reads.
    pub fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let data = self.read_available(n)?;

        if data.is_empty() && n > 0 {
            self.empty_reads += 1;
            let tolerated = match self.policy {
                TimeoutPolicy::Strict => false,
                TimeoutPolicy::Tolerate { max_consecutive } => self.empty_reads <= max_consecutive,
            };
            if !tolerated {
                return Err(Error::ReadTimeout { requested: n });
            }
            trace!(
                "Empty read tolerated ({} consecutive)",
                self.empty_reads
            );
        } else {
            self.empty_reads = 0;
        }

        Ok(data)
    }

    /// Read up to `n` bytes; an empty result is never an error.
    pub fn try_read(&mut self, n: usize) -> Result<Vec<u8>> {
        self.read_available(n)
    }

    /// Read exactly `n` bytes or fail.
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let data = self.read(n)?;
        if data.len() != n {
            return Err(Error::ShortRead {
                expected: n,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    fn read_available(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;

        let mut buf = vec![0u8; n];
        let mut filled = 0;
        let deadline = Instant::now() + self.timeouts.read_total(n);

        while filled < n {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let mut wait = deadline - now;
            if filled > 0 {
                wait = wait.min(self.timeouts.read_interval);
            }
            self.port.set_timeout(wait)?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(k) => filled += k,
                Err(e) if is_timeout(&e) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        buf.truncate(filled);
        trace!("RX {n}/{filled}: {buf:02X?}");
        Ok(buf)
    }

    /// Write all bytes and flush.
    ///
    /// Fails with [`Error::Write`] if the port accepted no bytes, or only part
    /// of the buffer before timing out.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        trace!("TX {}: {bytes:02X?}", bytes.len());

        self.port
            .set_timeout(self.timeouts.write_total(bytes.len()))?;

        let mut written = 0;
        while written < bytes.len() {
            match self.port.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(k) => written += k,
                Err(e) if is_timeout(&e) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if written == 0 && !bytes.is_empty() {
            return Err(Error::Write("no bytes accepted by the port".into()));
        }
        if written < bytes.len() {
            return Err(Error::Write(format!(
                "only {written} of {} bytes accepted",
                bytes.len()
            )));
        }

        self.port.flush()?;
        Ok(())
    }

    /// Discard bytes pending in the port buffers.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.port.clear_buffers()
    }

    /// Release the port. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.port.close()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport closed",
            )));
        }
        Ok(())
    }
}

#[cfg(feature = "native")]
impl Transport<crate::port::NativePort> {
    /// Open the serial device described by `config`.
    pub fn open(config: &crate::port::SerialConfig) -> Result<Self> {
        let port = crate::port::NativePort::open(config)?;
        Ok(Self::new(port, config.timeouts))
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

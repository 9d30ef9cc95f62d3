//! Port abstraction for the instrument's serial link.
//!
//! The protocol layers never touch an OS handle directly. They drive a
//! [`Port`], which is any `Read + Write` byte stream that can also change its
//! timeout and be closed.
//!
//! ```text
//! +---------------------------+
//! | Instrument / transfer     |
//! +-------------+-------------+
//!               |
//!               v
//! +-------------+-------------+
//! | Transport (read(n), write)|
//! +-------------+-------------+
//!               |
//!               v
//! +-------------+-------------+
//! |        Port trait         |
//! +-------------+-------------+
//!               |
//!               v
//! +-------------+-------------+
//! | NativePort (serialport)   |
//! +---------------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{Error, Result};

/// Baud rate used by every AquaMax / Embla instrument.
pub const INSTRUMENT_BAUD: u32 = 9600;

/// Receive/transmit queue size requested from the driver.
pub const DEFAULT_QUEUE_SIZE: usize = 4096;

/// Highest port number offered by the instrument software's port setting.
pub const MAX_PORT_NUMBER: u8 = 10;

/// Read and write timeout constants of the serial line.
///
/// The total timeout of an operation is `constant + per_byte * n`. Reads also
/// stop early once `read_interval` passes without a new byte after at least
/// one byte has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTimeouts {
    /// Maximum gap between two received bytes.
    pub read_interval: Duration,
    /// Fixed part of the total read timeout.
    pub read_total_constant: Duration,
    /// Per-byte part of the total read timeout.
    pub read_total_per_byte: Duration,
    /// Fixed part of the total write timeout.
    pub write_total_constant: Duration,
    /// Per-byte part of the total write timeout.
    pub write_total_per_byte: Duration,
}

impl Default for LineTimeouts {
    fn default() -> Self {
        Self {
            read_interval: Duration::from_millis(100),
            read_total_constant: Duration::from_millis(1000),
            read_total_per_byte: Duration::from_millis(20),
            write_total_constant: Duration::from_millis(100),
            write_total_per_byte: Duration::from_millis(20),
        }
    }
}

impl LineTimeouts {
    /// Total timeout for reading `n` bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_total(&self, n: usize) -> Duration {
        self.read_total_constant + self.read_total_per_byte * (n as u32)
    }

    /// Total timeout for writing `n` bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_total(&self, n: usize) -> Duration {
        self.write_total_constant + self.write_total_per_byte * (n as u32)
    }
}

/// Connection settings for one instrument port.
///
/// The line itself is always 8 data bits, no parity, one stop bit and no
/// flow control; only the port, speed, queue hint and timeouts vary.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "COM1", "/dev/ttyUSB0").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Requested driver queue size in each direction.
    pub queue_size: usize,
    /// Line timeouts.
    pub timeouts: LineTimeouts,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: INSTRUMENT_BAUD,
            queue_size: DEFAULT_QUEUE_SIZE,
            timeouts: LineTimeouts::default(),
        }
    }
}

impl SerialConfig {
    /// Create a configuration for a port name/path with instrument defaults.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

    /// Create a configuration for a numbered COM port (1-based).
    pub fn for_port_number(number: u8) -> Result<Self> {
        Ok(Self::new(port_name_for_number(number)?))
    }

    /// Create a configuration from user input: either a port number or a path.
    pub fn from_port_arg(arg: &str) -> Result<Self> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(Error::Config("empty serial port".into()));
        }
        match arg.parse::<u8>() {
            Ok(number) => Self::for_port_number(number),
            Err(_) => Ok(Self::new(arg)),
        }
    }

    /// Set the line timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: LineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Map a 1-based COM port number to the platform's device name.
///
/// `1` is `COM1` on Windows and `/dev/ttyS0` elsewhere.
pub fn port_name_for_number(number: u8) -> Result<String> {
    if number == 0 || number > MAX_PORT_NUMBER {
        return Err(Error::Config(format!(
            "port number {number} out of range 1-{MAX_PORT_NUMBER}"
        )));
    }
    if cfg!(windows) {
        Ok(format!("COM{number}"))
    } else {
        Ok(format!("/dev/ttyS{}", number - 1))
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Byte-stream endpoint the transport drives.
pub trait Port: Read + Write + Send {
    /// Set the timeout applied to the next blocking read or write.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Discard anything pending in the input and output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// Must be idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

//! Error types for aq3link.

use std::io;
use thiserror::Error;

/// Result type for aq3link operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for aq3link operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The serial device could not be opened.
    #[error("Could not open serial port {port}: {reason}")]
    Connection {
        /// Port name/path that failed to open.
        port: String,
        /// Backend error message.
        reason: String,
    },

    /// No bytes arrived before the read timeout elapsed.
    #[error("Read timeout: no data received (requested {requested} bytes)")]
    ReadTimeout {
        /// Number of bytes that were requested.
        requested: usize,
    },

    /// Fewer bytes arrived than a fixed-size field requires.
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Number of bytes required.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// The port accepted no bytes.
    #[error("Write error: {0}")]
    Write(String),

    /// The instrument did not acknowledge the reset that opens a download.
    #[error("Timeout waiting for reset acknowledgement")]
    ResetAckTimeout,

    /// A block written during download was never acknowledged.
    #[error("Block {block} was not acknowledged ({written} blocks written before it)")]
    BlockAckTimeout {
        /// Index of the unacknowledged block.
        block: usize,
        /// Number of blocks acknowledged before the failure.
        written: usize,
    },

    /// Block checksum received from the instrument does not match the payload.
    #[error("Checksum mismatch in block {block}: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Index of the offending block.
        block: usize,
        /// Checksum computed over the received payload.
        expected: u8,
        /// Checksum byte sent by the instrument.
        actual: u8,
    },

    /// The operation was cancelled between blocks.
    #[error("Cancelled after {completed} blocks")]
    Cancelled {
        /// Number of blocks fully transferred before cancellation.
        completed: usize,
    },

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A record cannot be encoded or does not fit the block layout.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for timeouts that usually mean "no instrument attached".
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ReadTimeout { .. } | Self::ResetAckTimeout => true,
            Self::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Returns `true` when a download stopped after the instrument started
    /// replacing its program store.
    ///
    /// The store is cleared as soon as block 0 arrives, so an unacknowledged
    /// block always counts, even block 0. A cancellation counts once at
    /// least one block went out.
    pub fn is_partial_write(&self) -> bool {
        match self {
            Self::BlockAckTimeout { .. } => true,
            Self::Cancelled { completed } => *completed > 0,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(Error::ReadTimeout { requested: 3 }.is_timeout());
        assert!(Error::ResetAckTimeout.is_timeout());
        assert!(Error::Io(io::Error::new(io::ErrorKind::TimedOut, "t")).is_timeout());
        assert!(!Error::Protocol("x".into()).is_timeout());
    }

    #[test]
    fn test_partial_write_classification() {
        assert!(Error::BlockAckTimeout { block: 2, written: 2 }.is_partial_write());
        assert!(Error::BlockAckTimeout { block: 0, written: 0 }.is_partial_write());
        assert!(Error::Cancelled { completed: 1 }.is_partial_write());
        assert!(!Error::Cancelled { completed: 0 }.is_partial_write());
        assert!(!Error::ResetAckTimeout.is_partial_write());
    }

    #[test]
    fn test_checksum_message_is_hex() {
        let e = Error::ChecksumMismatch {
            block: 4,
            expected: 0x0A,
            actual: 0xFF,
        };
        assert_eq!(
            e.to_string(),
            "Checksum mismatch in block 4: expected 0x0a, got 0xff"
        );
    }
}

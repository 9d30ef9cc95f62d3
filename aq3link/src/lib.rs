//! # aq3link
//!
//! Host-side serial protocol for AquaMax and Embla plate washers and
//! dispensers.
//!
//! This crate provides the core functionality for talking to an instrument
//! over its RS232 link:
//!
//! - Bounded blocking transport (9600 8N1, per-byte timeouts)
//! - Escape-framed commands and block checksums
//! - Program store upload and download with per-block acknowledgement
//! - Decoding of the 256-byte info and program blocks
//!
//! ## Features
//!
//! - `native` (default): serial port backend via the `serialport` crate
//! - `serde`: `Serialize` for decoded records and identity data
//!
//! ## Example
//!
//! ```rust,no_run
//! use aq3link::{CancelToken, Instrument, ProgramStore, SerialConfig, TransferOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0");
//!
//!     let (store, _report) = Instrument::with_connection(
//!         &config,
//!         &TransferOptions::default(),
//!         &CancelToken::new(),
//!         |instrument| instrument.upload_store(&mut |done, _| println!("block {done}")),
//!     )?;
//!
//!     for program in &store.programs {
//!         println!("{:>2} {}", program.slot, program.name);
//!     }
//!     store.save("programs.bin")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod clock;
pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod record;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    cancel::CancelToken,
    clock::{Clock, ManualClock, SystemClock},
    device::{DeviceCodes, Identity, Instrument, InstrumentKind, Model},
    error::{Error, Result},
    port::{LineTimeouts, Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        AckTimeoutPolicy, ChecksumMismatch, ChecksumPolicy, DownloadReport, TransferOptions,
        UploadReport,
    },
    record::{Block, BLOCK_SIZE, Command, CommandEntry, InfoBlock, Opcode, PlateFormat, ProgramBlock, ProgramStore},
    transport::{TimeoutPolicy, Transport},
};

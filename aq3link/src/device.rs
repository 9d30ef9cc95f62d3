//! Instrument identity and the high-level operations.
//!
//! [`Instrument`] binds a [`Transport`] to the command codec and the block
//! transfer so callers deal with whole operations: read the identity, upload
//! or download the program store, probe for a connected instrument.
//!
//! ## Example
//!
//! ```rust,no_run
//! use aq3link::{CancelToken, Instrument, SerialConfig, TransferOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::from_port_arg("1")?;
//!     let codes = Instrument::with_connection(
//!         &config,
//!         &TransferOptions::default(),
//!         &CancelToken::new(),
//!         |instrument| instrument.device_codes(),
//!     )?;
//!     println!("{} {}", codes.model(), codes.firmware_version());
//!     Ok(())
//! }
//! ```

use {
    crate::{
        cancel::CancelToken,
        clock::{Clock, SystemClock},
        error::{Error, Result},
        port::Port,
        protocol::{
            frame::{Command, decode_text, send_command},
            transfer::{BlockTransfer, DownloadReport, TransferOptions, UploadReport},
        },
        record::{Block, ProgramStore},
        transport::{TimeoutPolicy, Transport},
    },
    log::{debug, info, warn},
    std::fmt,
};

/// Longest text response read for `/D`, `/E` and `/G`.
pub const TEXT_RESPONSE_LEN: usize = 128;

/// Length of the `/F` date response.
pub const DATE_RESPONSE_LEN: usize = 8;

/// Instrument model, from the first device code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Model {
    /// AquaMax 12389.
    AquaMax12389,
    /// AquaMax 12392.
    AquaMax12392,
    /// AquaMax DW4, catalogue number 12394.
    AquaMaxDw4,
    /// AquaMax 12395.
    AquaMax12395,
    /// Embla 12384.
    Embla12384,
    /// Embla 12385.
    Embla12385,
    /// Embla 12386.
    Embla12386,
    /// Embla 12387.
    Embla12387,
    /// Embla 12388.
    Embla12388,
    /// Unrecognized model code.
    Unknown(u8),
}

impl Model {
    /// Decode a model code. Unrecognized codes are not an error.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x10 => Self::AquaMax12389,
            0x11 => Self::AquaMax12392,
            0x12 => Self::AquaMaxDw4,
            0x13 => Self::AquaMax12395,
            0x20 => Self::Embla12384,
            0x21 => Self::Embla12385,
            0x22 => Self::Embla12386,
            0x23 => Self::Embla12387,
            0x24 => Self::Embla12388,
            v => Self::Unknown(v),
        }
    }

    /// Model code byte.
    pub fn code(&self) -> u8 {
        match self {
            Self::AquaMax12389 => 0x10,
            Self::AquaMax12392 => 0x11,
            Self::AquaMaxDw4 => 0x12,
            Self::AquaMax12395 => 0x13,
            Self::Embla12384 => 0x20,
            Self::Embla12385 => 0x21,
            Self::Embla12386 => 0x22,
            Self::Embla12387 => 0x23,
            Self::Embla12388 => 0x24,
            Self::Unknown(v) => *v,
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AquaMax12389 => "AquaMax 12389",
            Self::AquaMax12392 => "AquaMax 12392",
            Self::AquaMaxDw4 => "AquaMax DW4 (12394)",
            Self::AquaMax12395 => "AquaMax 12395",
            Self::Embla12384 => "Embla 12384",
            Self::Embla12385 => "Embla 12385",
            Self::Embla12386 => "Embla 12386",
            Self::Embla12387 => "Embla 12387",
            Self::Embla12388 => "Embla 12388",
            Self::Unknown(_) => "Unknown model",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Instrument type, from the second device code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum InstrumentKind {
    /// Plate washer.
    Washer,
    /// Plate washer for robot integration.
    RobotWasher,
    /// Dispenser.
    Dispenser,
    /// Unrecognized type code.
    Unknown(u8),
}

impl InstrumentKind {
    /// Decode a type code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x10 => Self::Washer,
            0x11 => Self::RobotWasher,
            0x20 => Self::Dispenser,
            v => Self::Unknown(v),
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Washer => "Washer",
            Self::RobotWasher => "Washer (Robot)",
            Self::Dispenser => "Dispenser",
            Self::Unknown(_) => "Unknown type",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three bytes returned by `/C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceCodes {
    /// Model code.
    pub model_code: u8,
    /// Instrument type code.
    pub kind_code: u8,
    /// Firmware version, major in the high nibble, minor in the low nibble.
    pub version: u8,
}

impl DeviceCodes {
    /// Parse the `/C` response.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match *bytes {
            [model_code, kind_code, version, ..] => Ok(Self {
                model_code,
                kind_code,
                version,
            }),
            _ => Err(Error::ShortRead {
                expected: 3,
                actual: bytes.len(),
            }),
        }
    }

    /// Decoded model.
    pub fn model(&self) -> Model {
        Model::from_code(self.model_code)
    }

    /// Decoded instrument type.
    pub fn kind(&self) -> InstrumentKind {
        InstrumentKind::from_code(self.kind_code)
    }

    /// Firmware major version.
    pub fn version_major(&self) -> u8 {
        self.version >> 4
    }

    /// Firmware minor version.
    pub fn version_minor(&self) -> u8 {
        self.version & 0x0F
    }

    /// Firmware version as `major.minor`.
    pub fn firmware_version(&self) -> String {
        format!("{}.{}", self.version_major(), self.version_minor())
    }
}

impl fmt::Display for DeviceCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} ({}), {:02X} ({}), {:02X} ({})",
            self.model_code,
            self.model(),
            self.kind_code,
            self.kind(),
            self.version,
            self.firmware_version()
        )
    }
}

/// Everything the identity commands report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Identity {
    /// `/C` response.
    pub codes: DeviceCodes,
    /// `/D` response.
    pub firmware: String,
    /// `/G` response.
    pub serial_number: String,
}

/// A connected AquaMax / Embla instrument.
///
/// Generic over the port and the clock used for ACK budgets.
pub struct Instrument<P: Port, C: Clock = SystemClock> {
    transport: Transport<P>,
    clock: C,
    options: TransferOptions,
    cancel: CancelToken,
}

impl<P: Port> Instrument<P, SystemClock> {
    /// Wrap an open transport.
    pub fn new(transport: Transport<P>) -> Self {
        Self {
            transport,
            clock: SystemClock,
            options: TransferOptions::default(),
            cancel: CancelToken::new(),
        }
    }
}

impl<P: Port, C: Clock> Instrument<P, C> {
    /// Measure ACK budgets on another clock.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Instrument<P, C2> {
        Instrument {
            transport: self.transport,
            clock,
            options: self.options,
            cancel: self.cancel,
        }
    }

    /// Use custom transfer options.
    #[must_use]
    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    /// Check `cancel` between transferred blocks.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &Transport<P> {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut Transport<P> {
        &mut self.transport
    }

    /// Consume the instrument and return the transport.
    pub fn into_transport(self) -> Transport<P> {
        self.transport
    }

    /// Read the model, type and firmware version codes.
    pub fn device_codes(&mut self) -> Result<DeviceCodes> {
        send_command(&mut self.transport, Command::DeviceCodes)?;
        let data = self
            .transport
            .read_exact(3)?;
        let codes = DeviceCodes::from_bytes(&data)?;
        debug!("Device codes: {codes}");
        Ok(codes)
    }

    /// Read the firmware identification text.
    pub fn firmware_text(&mut self) -> Result<String> {
        self.query_text(Command::FirmwareText)
    }

    /// Read the serial number.
    pub fn serial_number(&mut self) -> Result<String> {
        self.query_text(Command::SerialNumber)
    }

    /// Read the name of the program file on the instrument.
    pub fn program_name(&mut self) -> Result<String> {
        self.query_text(Command::ProgramName)
    }

    /// Read the date of the program file, `DDMMYYYY`.
    pub fn program_date(&mut self) -> Result<String> {
        send_command(&mut self.transport, Command::ProgramDate)?;
        let data = self
            .transport
            .read_exact(DATE_RESPONSE_LEN)?;
        Ok(decode_text(&data))
    }

    /// Read device codes, firmware text and serial number.
    pub fn identify(&mut self) -> Result<Identity> {
        Ok(Identity {
            codes: self.device_codes()?,
            firmware: self.firmware_text()?,
            serial_number: self.serial_number()?,
        })
    }

    fn query_text(&mut self, command: Command) -> Result<String> {
        send_command(&mut self.transport, command)?;
        let data = self
            .transport
            .read(TEXT_RESPONSE_LEN)?;
        Ok(decode_text(&data))
    }

    /// Upload the raw program store.
    pub fn upload_programs(&mut self, progress: &mut dyn FnMut(usize, usize)) -> Result<UploadReport> {
        info!("Uploading programs from {}", self.transport.port().name());
        BlockTransfer::new(&mut self.transport, &self.clock)
            .with_options(
                self.options
                    .clone(),
            )
            .with_cancel(
                self.cancel
                    .clone(),
            )
            .upload(progress)
    }

    /// Upload and decode the program store.
    ///
    /// An upload that ends before the info block is a protocol error.
    pub fn upload_store(&mut self, progress: &mut dyn FnMut(usize, usize)) -> Result<(ProgramStore, UploadReport)> {
        let report = self.upload_programs(progress)?;
        if report
            .blocks
            .is_empty()
        {
            return Err(Error::Protocol("instrument sent no info block".into()));
        }
        let store = ProgramStore::from_blocks(&report.blocks)?;
        Ok((store, report))
    }

    /// Write raw blocks, replacing the instrument's program store.
    pub fn download_programs(
        &mut self,
        blocks: &[Block],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<DownloadReport> {
        if blocks.is_empty() {
            return Err(Error::InvalidRecord("nothing to download".into()));
        }
        info!(
            "Downloading {} blocks to {}",
            blocks.len(),
            self.transport.port().name()
        );
        BlockTransfer::new(&mut self.transport, &self.clock)
            .with_options(
                self.options
                    .clone(),
            )
            .with_cancel(
                self.cancel
                    .clone(),
            )
            .download(blocks, progress)
    }

    /// Validate and write a decoded program store.
    pub fn download_store(
        &mut self,
        store: &ProgramStore,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<DownloadReport> {
        store.validate()?;
        self.download_programs(&store.to_blocks(), progress)
    }

    /// Check whether an instrument answers.
    ///
    /// Returns `Ok(None)` when the line stays silent. Port faults are still
    /// errors.
    pub fn probe(&mut self) -> Result<Option<DeviceCodes>> {
        let previous = self
            .transport
            .policy();
        self.transport
            .set_policy(TimeoutPolicy::PROBE);
        let result = self.probe_codes();
        self.transport
            .set_policy(previous);

        match result {
            Ok(codes) => {
                info!("Found {} on {}", codes.model(), self.transport.port().name());
                Ok(Some(codes))
            },
            Err(e) if e.is_timeout() => {
                debug!("No instrument on {}: {e}", self.transport.port().name());
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    fn probe_codes(&mut self) -> Result<DeviceCodes> {
        send_command(&mut self.transport, Command::DeviceCodes)?;
        let mut data = Vec::with_capacity(3);
        while data.len() < 3 {
            let chunk = self
                .transport
                .read(3 - data.len())?;
            data.extend_from_slice(&chunk);
        }
        DeviceCodes::from_bytes(&data)
    }

    /// Run `op` and close the connection afterwards, whatever the outcome.
    pub fn run<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = op(self);
        let closed = self.close();
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!("Failed to close port: {close_err}");
                }
                Err(e)
            },
        }
    }

    /// Release the port.
    pub fn close(&mut self) -> Result<()> {
        self.transport
            .close()
    }
}

#[cfg(feature = "native")]
impl Instrument<crate::port::NativePort, SystemClock> {
    /// Open the serial port described by `config`.
    pub fn open(config: &crate::port::SerialConfig) -> Result<Self> {
        Ok(Self::new(Transport::open(config)?))
    }

    /// Open a connection, run `op`, and close it again.
    ///
    /// Every logical operation gets its own connection.
    pub fn with_connection<T>(
        config: &crate::port::SerialConfig,
        options: &TransferOptions,
        cancel: &CancelToken,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let mut instrument = Self::open(config)?
            .with_options(options.clone())
            .with_cancel(cancel.clone());
        instrument.run(op)
    }
}

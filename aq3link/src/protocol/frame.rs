//! Command framing and block checksums.
//!
//! ## Frame Format
//!
//! ```text
//! +-----+-----+--------+-----+
//! | ESC |  /  | letter |  ;  |
//! +-----+-----+--------+-----+
//! | 1B  | 2F  |   X    | 3B  |
//! +-----+-----+--------+-----+
//! ```
//!
//! The instrument firmware looks for the escape byte on its own before it
//! parses the mnemonic, so frames go out as two writes: `[ESC]` and then the
//! remaining three bytes.
//!
//! Block payloads carry a one-byte checksum chosen so that the byte-sum of
//! the payload plus the checksum is zero modulo 256.

use {
    crate::{error::Result, port::Port, transport::Transport},
    log::debug,
};

/// Escape byte that opens every command frame.
pub const ESC: u8 = 0x1B;

/// Acknowledge byte.
pub const ACK: u8 = 0x06;

/// Third byte of the upload status header when no blocks remain.
pub const UPLOAD_END: u8 = b'Z';

/// Length of a complete command frame.
pub const FRAME_LEN: usize = 4;

/// Instrument commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `/C`: model, type and firmware version codes (3 bytes).
    DeviceCodes,
    /// `/D`: firmware identification text.
    FirmwareText,
    /// `/E`: name of the program file loaded on the instrument.
    ProgramName,
    /// `/F`: date of the program file (8 bytes, `DDMMYYYY`).
    ProgramDate,
    /// `/G`: instrument serial number.
    SerialNumber,
    /// `/U`: start uploading the program store to the host.
    Upload,
    /// `/R`: reset the program store ahead of a download.
    Reset,
    /// `/A`: one block follows.
    WriteBlock,
    /// `/z`: end of a download.
    EndTransmission,
}

impl Command {
    /// The letter after `/`.
    pub fn mnemonic(self) -> u8 {
        match self {
            Self::DeviceCodes => b'C',
            Self::FirmwareText => b'D',
            Self::ProgramName => b'E',
            Self::ProgramDate => b'F',
            Self::SerialNumber => b'G',
            Self::Upload => b'U',
            Self::Reset => b'R',
            Self::WriteBlock => b'A',
            Self::EndTransmission => b'z',
        }
    }

    /// Full 4-byte frame for this command.
    pub fn frame(self) -> [u8; FRAME_LEN] {
        build_command(self.mnemonic())
    }
}

/// Build the frame `ESC / mnemonic ;`.
pub fn build_command(mnemonic: u8) -> [u8; FRAME_LEN] {
    [ESC, b'/', mnemonic, b';']
}

/// Send a command as the escape byte followed by the mnemonic and terminator.
pub fn send_command<P: Port>(transport: &mut Transport<P>, command: Command) -> Result<()> {
    let frame = command.frame();
    debug!("Sending /{}", char::from(command.mnemonic()));
    transport.write(&frame[..1])?;
    transport.write(&frame[1..])
}

/// Checksum of a block payload: the two's complement of its byte-sum.
pub fn checksum(payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Check a payload against a received checksum byte the way the firmware
/// does: the byte-sum of payload and checksum must be zero.
pub fn verify_checksum(payload: &[u8], check: u8) -> bool {
    payload
        .iter()
        .fold(check, |acc, &b| acc.wrapping_add(b))
        == 0
}

/// Decode a NUL-terminated text response, one byte per char.
pub fn decode_text(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .map(|&b| char::from(b))
        .collect()
}

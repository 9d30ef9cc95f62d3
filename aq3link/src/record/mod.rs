//! Program store records.
//!
//! The instrument keeps its programs as fixed 256-byte blocks: slot 0 is the
//! info block, slots 1-99 hold one program each.
//!
//! ## Program Block Layout
//!
//! ```text
//! +--------+------+----------------------------------------+
//! | Offset | Size | Field                                  |
//! +--------+------+----------------------------------------+
//! |      0 |    1 | slot number                            |
//! |      1 |   33 | program name                           |
//! |     34 |    1 | local-edit flag                        |
//! |     35 |    1 | padding                                |
//! |     36 |   33 | plate name                             |
//! |     69 |    1 | plate type                             |
//! |     70 |   32 | plate geometry and liquid settings     |
//! |    102 |    4 | reserved                               |
//! |    106 |   50 | command opcodes                        |
//! |    156 |  100 | command parameters (u16 LE)            |
//! +--------+------+----------------------------------------+
//! ```
//!
//! Decoding keeps every byte, so `encode(decode(block)) == block` for any
//! input.

pub mod command;
pub mod program;
pub mod text;

pub use {
    command::{AspirateSpeed, Command, CommandEntry, Opcode},
    program::{InfoBlock, PlateFormat, ProgramBlock, format_date},
    text::FixedText,
};

use {
    crate::error::{Error, Result},
    log::debug,
    std::{collections::HashSet, fs, path::Path},
};

/// Size of one block.
pub const BLOCK_SIZE: usize = 256;

/// One raw block.
pub type Block = [u8; BLOCK_SIZE];

/// Highest program slot.
pub const MAX_PROGRAMS: usize = 99;

/// Command slots per program.
pub const COMMAND_SLOTS: usize = 50;

/// Byte offsets inside a block.
pub mod layout {
    /// Slot number (both block kinds).
    pub const SLOT: usize = 0;

    /// Info block: file name.
    pub const INFO_NAME: usize = 1;
    /// Info block: file name length.
    pub const INFO_NAME_LEN: usize = 33;
    /// Info block: file date.
    pub const INFO_DATE: usize = 34;
    /// Info block: file date length.
    pub const INFO_DATE_LEN: usize = 9;
    /// Info block: first reserved byte.
    pub const INFO_RESERVED: usize = 43;

    /// Program name.
    pub const NAME: usize = 1;
    /// Program and plate name length.
    pub const NAME_LEN: usize = 33;
    /// Local-edit flag.
    pub const LOCAL_EDIT: usize = 34;
    /// Padding byte.
    pub const PAD: usize = 35;
    /// Plate name.
    pub const PLATE_NAME: usize = 36;
    /// Plate type code.
    pub const PLATE_TYPE: usize = 69;
    /// Plate height.
    pub const PLATE_HEIGHT: usize = 70;
    /// Well depth.
    pub const WELL_DEPTH: usize = 72;
    /// Plate offset.
    pub const PLATE_OFFSET: usize = 74;
    /// Max well volume.
    pub const MAX_VOLUME: usize = 76;
    /// Distance between wells.
    pub const WELL_DISTANCE: usize = 78;
    /// Row mask, rows A-P.
    pub const ROWS0: usize = 80;
    /// Row mask, rows Q-AF.
    pub const ROWS1: usize = 82;
    /// Aspiration offset.
    pub const ASP_OFFSET: usize = 84;
    /// Four liquid viscosity factors.
    pub const LIQUID_FACTORS: usize = 86;
    /// Four dispense pressures.
    pub const DISPENSE_PRESSURES: usize = 94;
    /// Reserved bytes.
    pub const RESERVED: usize = 102;
    /// Command opcodes.
    pub const OPCODES: usize = 106;
    /// Command parameters.
    pub const PARAMS: usize = 156;
}

/// The decoded program store: info block plus used programs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProgramStore {
    /// Slot 0.
    pub info: InfoBlock,
    /// Programs up to the first empty slot.
    pub programs: Vec<ProgramBlock>,
}

impl ProgramStore {
    /// Decode raw blocks as uploaded. The first block is the info block.
    pub fn from_blocks(blocks: &[Block]) -> Result<Self> {
        let (first, rest) = blocks
            .split_first()
            .ok_or_else(|| Error::InvalidRecord("no blocks".into()))?;

        let info = InfoBlock::decode(first);
        let programs: Vec<ProgramBlock> = rest
            .iter()
            .map(ProgramBlock::decode)
            .take_while(|p| !p.is_empty())
            .collect();

        if programs.len() < rest.len() {
            debug!(
                "Ignoring {} blocks after the first empty program slot",
                rest.len() - programs.len()
            );
        }

        Ok(Self { info, programs })
    }

    /// Encode back into blocks, info block first.
    pub fn to_blocks(&self) -> Vec<Block> {
        std::iter::once(
            self.info
                .encode(),
        )
        .chain(
            self.programs
                .iter()
                .map(ProgramBlock::encode),
        )
        .collect()
    }

    /// Check slot numbering before writing to an instrument.
    pub fn validate(&self) -> Result<()> {
        if self.info.slot != 0 {
            return Err(Error::InvalidRecord(format!(
                "info block has slot {}, expected 0",
                self.info.slot
            )));
        }
        if self.programs.len() > MAX_PROGRAMS {
            return Err(Error::InvalidRecord(format!(
                "{} programs, at most {MAX_PROGRAMS} fit",
                self.programs.len()
            )));
        }

        let mut seen = HashSet::new();
        for program in &self.programs {
            let slot = usize::from(program.slot);
            if slot == 0 || slot > MAX_PROGRAMS {
                return Err(Error::InvalidRecord(format!(
                    "program {:?} has slot {slot}, expected 1-{MAX_PROGRAMS}",
                    program
                        .name
                        .to_trimmed()
                )));
            }
            if program.is_empty() {
                return Err(Error::InvalidRecord(format!("program in slot {slot} has no name")));
            }
            if !seen.insert(slot) {
                return Err(Error::InvalidRecord(format!("slot {slot} used twice")));
            }
        }
        Ok(())
    }

    /// Program stored in `slot`.
    pub fn find(&self, slot: u8) -> Option<&ProgramBlock> {
        self.programs
            .iter()
            .find(|p| p.slot == slot)
    }

    /// Decode a raw image file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_blocks(&blocks_from_image(&data)?)
    }

    /// Write the store as a raw image file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, image_from_blocks(&self.to_blocks()))?;
        Ok(())
    }
}

/// Split a raw image (blocks back to back) into blocks.
pub fn blocks_from_image(data: &[u8]) -> Result<Vec<Block>> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidRecord(format!(
            "image size {} is not a non-zero multiple of {BLOCK_SIZE}",
            data.len()
        )));
    }
    let count = data.len() / BLOCK_SIZE;
    if count > MAX_PROGRAMS + 1 {
        return Err(Error::InvalidRecord(format!(
            "image holds {count} blocks, at most {} fit",
            MAX_PROGRAMS + 1
        )));
    }

    Ok(data
        .chunks_exact(BLOCK_SIZE)
        .map(|chunk| {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            block
        })
        .collect())
}

/// Concatenate blocks into a raw image.
pub fn image_from_blocks(blocks: &[Block]) -> Vec<u8> {
    blocks.concat()
}

//! Info and program blocks.

use {
    super::{
        BLOCK_SIZE, Block, COMMAND_SLOTS,
        command::{Command, CommandEntry},
        layout,
        text::FixedText,
    },
    byteorder::{ByteOrder, LittleEndian},
    std::fmt,
};

/// Plate format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PlateFormat {
    /// 96-well plate.
    Wells96,
    /// 384-well plate.
    Wells384,
    /// 1536-well plate.
    Wells1536,
    /// Unrecognized code.
    Unknown(u8),
}

impl PlateFormat {
    /// Decode the plate type byte.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Wells96,
            2 => Self::Wells384,
            3 => Self::Wells1536,
            v => Self::Unknown(v),
        }
    }

    /// The plate type byte.
    pub fn code(&self) -> u8 {
        match self {
            Self::Wells96 => 1,
            Self::Wells384 => 2,
            Self::Wells1536 => 3,
            Self::Unknown(v) => *v,
        }
    }

    /// Number of wells, if known.
    pub fn wells(&self) -> Option<u16> {
        match self {
            Self::Wells96 => Some(96),
            Self::Wells384 => Some(384),
            Self::Wells1536 => Some(1536),
            Self::Unknown(_) => None,
        }
    }

    /// Number of plate rows, if known.
    pub fn rows(&self) -> Option<u8> {
        match self {
            Self::Wells96 => Some(8),
            Self::Wells384 => Some(16),
            Self::Wells1536 => Some(32),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Display for PlateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.wells() {
            Some(n) => write!(f, "{n}-well"),
            None => write!(f, "unknown plate type {}", self.code()),
        }
    }
}

/// Slot 0: metadata of the program file loaded on the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InfoBlock {
    /// Slot marker, 0 for a well-formed store.
    pub slot: u8,
    /// Program file name.
    pub file_name: FixedText<{ layout::INFO_NAME_LEN }>,
    /// File date, `DDMMYYYY` plus NUL.
    pub date: FixedText<{ layout::INFO_DATE_LEN }>,
    /// Bytes 43..256, kept verbatim.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub reserved: Vec<u8>,
}

impl InfoBlock {
    /// Create an info block for a file name and `DDMMYYYY` date.
    pub fn new(file_name: FixedText<{ layout::INFO_NAME_LEN }>, date: FixedText<{ layout::INFO_DATE_LEN }>) -> Self {
        Self {
            slot: 0,
            file_name,
            date,
            reserved: vec![0; BLOCK_SIZE - layout::INFO_RESERVED],
        }
    }

    /// Decode slot 0.
    pub fn decode(block: &Block) -> Self {
        Self {
            slot: block[layout::SLOT],
            file_name: FixedText::read(&block[layout::INFO_NAME..]),
            date: FixedText::read(&block[layout::INFO_DATE..]),
            reserved: block[layout::INFO_RESERVED..].to_vec(),
        }
    }

    /// Encode into a block.
    pub fn encode(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        block[layout::SLOT] = self.slot;
        block[layout::INFO_NAME..layout::INFO_NAME + layout::INFO_NAME_LEN]
            .copy_from_slice(self.file_name.as_bytes());
        block[layout::INFO_DATE..layout::INFO_DATE + layout::INFO_DATE_LEN]
            .copy_from_slice(self.date.as_bytes());
        let n = self
            .reserved
            .len()
            .min(BLOCK_SIZE - layout::INFO_RESERVED);
        block[layout::INFO_RESERVED..layout::INFO_RESERVED + n].copy_from_slice(&self.reserved[..n]);
        block
    }

    /// Date as `DD.MM.YYYY` when the field holds eight digits, else as stored.
    pub fn display_date(&self) -> String {
        format_date(&self.date.to_trimmed())
    }
}

/// Format an eight-digit `DDMMYYYY` date as `DD.MM.YYYY`.
///
/// Anything else, including the instrument's own date reply when it is not
/// eight digits, is returned trimmed and unchanged.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() == 8
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit())
    {
        format!("{}.{}.{}", &raw[..2], &raw[2..4], &raw[4..])
    } else {
        raw.to_string()
    }
}

/// Slots 1-99: one wash/dispense program.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProgramBlock {
    /// Program number.
    pub slot: u8,
    /// Program name.
    pub name: FixedText<{ layout::NAME_LEN }>,
    /// 0 when the program came from a PC file, 1 when edited on the
    /// instrument keypad.
    pub local_edit: u8,
    /// Padding byte after the edit flag.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub pad: u8,
    /// Plate name.
    pub plate_name: FixedText<{ layout::NAME_LEN }>,
    /// Plate type code, see [`PlateFormat`].
    pub plate_type: u8,
    /// Plate height in 1/100 mm.
    pub plate_height: u16,
    /// Well depth in 1/100 mm.
    pub well_depth: u16,
    /// Distance from the plate edge to the first well in 1/100 mm.
    pub plate_offset: u16,
    /// Maximum well volume in 1/10 µl.
    pub max_volume: u16,
    /// Distance between well centres in 1/1000 mm.
    pub well_distance: u16,
    /// Row masks: rows A-P, then rows Q-AF (1536-well plates only).
    pub rows: [u16; 2],
    /// Aspiration offset in 1/10 mm.
    pub aspiration_offset: u16,
    /// Viscosity factor per liquid, 100 = 1.00.
    pub liquid_factors: [u16; 4],
    /// Dispense pressure per liquid in mbar.
    pub dispense_pressures: [u16; 4],
    /// Bytes 102..106, kept verbatim.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub reserved: [u8; 4],
    /// All 50 command slots, including those after `END`.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub table: Vec<CommandEntry>,
}

impl ProgramBlock {
    /// Decode a program slot.
    pub fn decode(block: &Block) -> Self {
        let word = |offset: usize| LittleEndian::read_u16(&block[offset..offset + 2]);
        let words = |offset: usize| -> [u16; 4] { std::array::from_fn(|i| word(offset + 2 * i)) };

        let table = (0..COMMAND_SLOTS)
            .map(|i| CommandEntry {
                opcode: block[layout::OPCODES + i],
                param: word(layout::PARAMS + 2 * i),
            })
            .collect();

        let mut reserved = [0u8; 4];
        reserved.copy_from_slice(&block[layout::RESERVED..layout::RESERVED + 4]);

        Self {
            slot: block[layout::SLOT],
            name: FixedText::read(&block[layout::NAME..]),
            local_edit: block[layout::LOCAL_EDIT],
            pad: block[layout::PAD],
            plate_name: FixedText::read(&block[layout::PLATE_NAME..]),
            plate_type: block[layout::PLATE_TYPE],
            plate_height: word(layout::PLATE_HEIGHT),
            well_depth: word(layout::WELL_DEPTH),
            plate_offset: word(layout::PLATE_OFFSET),
            max_volume: word(layout::MAX_VOLUME),
            well_distance: word(layout::WELL_DISTANCE),
            rows: [word(layout::ROWS0), word(layout::ROWS1)],
            aspiration_offset: word(layout::ASP_OFFSET),
            liquid_factors: words(layout::LIQUID_FACTORS),
            dispense_pressures: words(layout::DISPENSE_PRESSURES),
            reserved,
            table,
        }
    }

    /// Encode into a block. Missing table slots are written as `END`.
    pub fn encode(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        let mut put = |offset: usize, value: u16| LittleEndian::write_u16(&mut block[offset..offset + 2], value);

        put(layout::PLATE_HEIGHT, self.plate_height);
        put(layout::WELL_DEPTH, self.well_depth);
        put(layout::PLATE_OFFSET, self.plate_offset);
        put(layout::MAX_VOLUME, self.max_volume);
        put(layout::WELL_DISTANCE, self.well_distance);
        put(layout::ROWS0, self.rows[0]);
        put(layout::ROWS1, self.rows[1]);
        put(layout::ASP_OFFSET, self.aspiration_offset);
        for i in 0..4 {
            put(layout::LIQUID_FACTORS + 2 * i, self.liquid_factors[i]);
            put(layout::DISPENSE_PRESSURES + 2 * i, self.dispense_pressures[i]);
        }
        for (i, entry) in self
            .table
            .iter()
            .take(COMMAND_SLOTS)
            .enumerate()
        {
            put(layout::PARAMS + 2 * i, entry.param);
        }

        block[layout::SLOT] = self.slot;
        block[layout::NAME..layout::NAME + layout::NAME_LEN].copy_from_slice(self.name.as_bytes());
        block[layout::LOCAL_EDIT] = self.local_edit;
        block[layout::PAD] = self.pad;
        block[layout::PLATE_NAME..layout::PLATE_NAME + layout::NAME_LEN]
            .copy_from_slice(self.plate_name.as_bytes());
        block[layout::PLATE_TYPE] = self.plate_type;
        block[layout::RESERVED..layout::RESERVED + 4].copy_from_slice(&self.reserved);
        for (i, entry) in self
            .table
            .iter()
            .take(COMMAND_SLOTS)
            .enumerate()
        {
            block[layout::OPCODES + i] = entry.opcode;
        }
        block
    }

    /// An empty slot marks the end of the used programs.
    pub fn is_empty(&self) -> bool {
        self.name
            .is_empty()
    }

    /// Whether the program was edited on the instrument.
    pub fn is_edited_locally(&self) -> bool {
        self.local_edit != 0
    }

    /// Decoded plate type.
    pub fn plate_format(&self) -> PlateFormat {
        PlateFormat::from_code(self.plate_type)
    }

    /// Table entries up to, not including, the first `END`.
    pub fn entries(&self) -> &[CommandEntry] {
        let end = self
            .table
            .iter()
            .position(CommandEntry::is_end)
            .unwrap_or(self.table.len());
        &self.table[..end]
    }

    /// Typed commands up to the first `END`.
    pub fn commands(&self) -> Vec<Command> {
        self.entries()
            .iter()
            .filter_map(CommandEntry::command)
            .collect()
    }

    /// Replace the command table; the remaining slots are set to `END`.
    pub fn set_commands(&mut self, commands: &[Command]) -> crate::Result<()> {
        if commands.len() > COMMAND_SLOTS {
            return Err(crate::Error::InvalidRecord(format!(
                "{} commands do not fit in {COMMAND_SLOTS} slots",
                commands.len()
            )));
        }
        self.table = commands
            .iter()
            .map(Command::to_entry)
            .collect::<crate::Result<_>>()?;
        self.table
            .resize(COMMAND_SLOTS, CommandEntry::default());
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl ProgramBlock {
    /// Serializable view including the decoded command list.
    pub fn to_json_view(&self) -> ProgramView<'_> {
        ProgramView {
            program: self,
            plate_format: self.plate_format(),
            commands: self.commands(),
        }
    }
}

/// A program together with its decoded command list.
#[cfg(feature = "serde")]
#[derive(Debug, serde::Serialize)]
pub struct ProgramView<'a> {
    /// Stored fields.
    #[serde(flatten)]
    pub program: &'a ProgramBlock,
    /// Decoded plate type.
    pub plate_format: PlateFormat,
    /// Commands before `END`.
    pub commands: Vec<Command>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::command::Opcode;

    fn sample_block() -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = 1;
        block[1..6].copy_from_slice(b"WASH1");
        block[34] = 1;
        block[35] = 0xA5;
        block[36..42].copy_from_slice(b"GREINE");
        block[69] = 2;
        block[70..72].copy_from_slice(&1450u16.to_le_bytes());
        block[80..82].copy_from_slice(&0xFFFFu16.to_le_bytes());
        block[86..88].copy_from_slice(&100u16.to_le_bytes());
        block[100..102].copy_from_slice(&250u16.to_le_bytes());
        block[102..106].copy_from_slice(&[1, 2, 3, 4]);
        // ASP2, DISP1 50.0 µl, END
        block[106] = 2;
        block[107] = 20;
        block[156..158].copy_from_slice(&0x0A14u16.to_le_bytes());
        block[158..160].copy_from_slice(&500u16.to_le_bytes());
        block
    }

    #[test]
    fn test_decode_fields() {
        let p = ProgramBlock::decode(&sample_block());
        assert_eq!(p.slot, 1);
        assert_eq!(p.name.to_trimmed(), "WASH1");
        assert!(p.is_edited_locally());
        assert_eq!(p.plate_name.to_trimmed(), "GREINE");
        assert_eq!(p.plate_format(), PlateFormat::Wells384);
        assert_eq!(p.plate_height, 1450);
        assert_eq!(p.rows, [0xFFFF, 0]);
        assert_eq!(p.liquid_factors, [100, 0, 0, 0]);
        assert_eq!(p.dispense_pressures, [0, 0, 0, 250]);
        assert_eq!(p.table.len(), COMMAND_SLOTS);
    }

    #[test]
    fn test_plate_height_little_endian() {
        let mut block = sample_block();
        block[70] = 0x64;
        block[71] = 0x00;
        assert_eq!(ProgramBlock::decode(&block).plate_height, 100);

        block[70] = 0xFF;
        block[71] = 0xFF;
        assert_eq!(ProgramBlock::decode(&block).plate_height, 65535);
    }

    #[test]
    fn test_commands_stop_at_end() {
        let mut block = sample_block();
        // Garbage after END must not be interpreted.
        for b in &mut block[109..156] {
            *b = 0xEE;
        }
        for b in &mut block[162..256] {
            *b = 0xEE;
        }
        let p = ProgramBlock::decode(&block);
        assert_eq!(p.entries().len(), 2);
        assert_eq!(
            p.commands(),
            vec![
                Command::Aspirate {
                    speed: crate::record::command::AspirateSpeed::Medium,
                    time_ds: 10,
                    height_dmm: 20,
                },
                Command::Dispense {
                    liquid: 1,
                    volume_dul: 500,
                    low_pressure: false,
                },
            ]
        );
        assert_eq!(p.encode(), block);
    }

    #[test]
    fn test_full_table_without_end() {
        let mut block = sample_block();
        for b in &mut block[106..156] {
            *b = 30;
        }
        let p = ProgramBlock::decode(&block);
        assert_eq!(p.entries().len(), COMMAND_SLOTS);
        assert_eq!(p.table[COMMAND_SLOTS - 1].opcode(), Opcode::Soak);
    }

    #[test]
    fn test_unknown_opcode_surfaces() {
        let mut block = sample_block();
        block[106] = 99;
        let p = ProgramBlock::decode(&block);
        assert_eq!(p.entries()[0].opcode(), Opcode::Unknown(99));
    }

    #[test]
    fn test_round_trip_preserves_reserved_bytes() {
        let block = sample_block();
        let p = ProgramBlock::decode(&block);
        assert_eq!(p.pad, 0xA5);
        assert_eq!(p.reserved, [1, 2, 3, 4]);
        assert_eq!(p.encode(), block);
    }

    #[test]
    fn test_round_trip_arbitrary_bytes() {
        let mut block = [0u8; BLOCK_SIZE];
        for (i, b) in block.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }
        assert_eq!(ProgramBlock::decode(&block).encode(), block);
        assert_eq!(InfoBlock::decode(&block).encode(), block);
    }

    #[test]
    fn test_set_commands() {
        let mut p = ProgramBlock::decode(&sample_block());
        p.set_commands(&[Command::Soak { seconds: 5 }])
            .unwrap();
        assert_eq!(p.commands(), vec![Command::Soak { seconds: 5 }]);
        assert_eq!(p.table.len(), COMMAND_SLOTS);

        let too_many = vec![Command::Soak { seconds: 1 }; COMMAND_SLOTS + 1];
        assert!(p.set_commands(&too_many).is_err());
    }

    #[test]
    fn test_set_commands_rejects_out_of_range_fields() {
        let mut p = ProgramBlock::decode(&sample_block());
        let before = p.clone();

        for command in [
            Command::Repeat {
                count: 11,
                from_command: 1,
            },
            Command::Dispense {
                liquid: 0,
                volume_dul: 100,
                low_pressure: false,
            },
            Command::Dispense {
                liquid: 250,
                volume_dul: 100,
                low_pressure: false,
            },
            Command::RowSelect { bank: 2, mask: 1 },
        ] {
            assert!(matches!(
                p.set_commands(&[Command::Soak { seconds: 5 }, command]),
                Err(crate::Error::InvalidRecord(_))
            ));
            assert_eq!(p, before);
        }

        let repeat = Command::Repeat {
            count: 10,
            from_command: 1,
        };
        p.set_commands(&[Command::Soak { seconds: 5 }, repeat])
            .unwrap();
        let decoded = ProgramBlock::decode(&p.encode());
        assert_eq!(decoded.commands(), vec![Command::Soak { seconds: 5 }, repeat]);
    }

    #[test]
    fn test_info_block() {
        let mut block = [0u8; BLOCK_SIZE];
        block[1..9].copy_from_slice(b"CELLWASH");
        block[34..42].copy_from_slice(b"24121998");
        block[200] = 0x42;

        let info = InfoBlock::decode(&block);
        assert_eq!(info.slot, 0);
        assert_eq!(info.file_name.to_trimmed(), "CELLWASH");
        assert_eq!(info.date.to_trimmed(), "24121998");
        assert_eq!(info.display_date(), "24.12.1998");
        assert_eq!(info.encode(), block);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("01022003"), "01.02.2003");
        assert_eq!(format_date(" 24121998 "), "24.12.1998");
        assert_eq!(format_date("2003-02-01"), "2003-02-01");
        assert_eq!(format_date("0102200"), "0102200");
        assert_eq!(format_date(""), "");
    }

    #[test]
    fn test_plate_format() {
        assert_eq!(PlateFormat::from_code(1).wells(), Some(96));
        assert_eq!(PlateFormat::from_code(3).rows(), Some(32));
        assert_eq!(PlateFormat::from_code(9), PlateFormat::Unknown(9));
        assert_eq!(PlateFormat::from_code(9).code(), 9);
        assert_eq!(PlateFormat::Wells384.to_string(), "384-well");
    }
}

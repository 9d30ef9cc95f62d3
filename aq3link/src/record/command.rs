//! Program command table.
//!
//! A program holds up to 50 commands stored as two parallel arrays: one
//! opcode byte per command and one little-endian `u16` parameter per command.
//! The table ends at the first `END` opcode.

use {
    crate::error::{Error, Result},
    std::fmt,
};

/// Liquid channels addressed by `DISP` and `DISPL`.
pub const LIQUIDS: std::ops::RangeInclusive<u8> = 1..=4;

/// Repeat counts addressed by `REP`.
pub const REPEAT_COUNTS: std::ops::RangeInclusive<u8> = 1..=10;

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Opcode {
    /// End of the command table.
    End,
    /// Aspirate at low speed.
    AspirateLow,
    /// Aspirate at medium speed.
    AspirateMedium,
    /// Aspirate at high speed.
    AspirateHigh,
    /// Dispense liquid 1-4.
    Dispense(u8),
    /// Soak for a number of seconds.
    Soak,
    /// Repeat earlier commands; the count is 1-10.
    Repeat(u8),
    /// Dispense liquid 1-4 at low pressure.
    DispenseLowPressure(u8),
    /// Select rows 1-16.
    Row0,
    /// Select rows 17-32 (1536-well plates).
    Row1,
    /// Unrecognized opcode.
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::End,
            1 => Self::AspirateLow,
            2 => Self::AspirateMedium,
            3 => Self::AspirateHigh,
            20..=23 => Self::Dispense(value - 19),
            30 => Self::Soak,
            40..=49 => Self::Repeat(value - 39),
            50..=53 => Self::DispenseLowPressure(value - 49),
            60 => Self::Row0,
            61 => Self::Row1,
            v => Self::Unknown(v),
        }
    }
}

impl Opcode {
    /// Opcode byte, or `None` when a liquid or repeat number is out of range.
    pub fn code(&self) -> Option<u8> {
        match *self {
            Self::End => Some(0),
            Self::AspirateLow => Some(1),
            Self::AspirateMedium => Some(2),
            Self::AspirateHigh => Some(3),
            Self::Dispense(n) if LIQUIDS.contains(&n) => Some(19 + n),
            Self::Soak => Some(30),
            Self::Repeat(n) if REPEAT_COUNTS.contains(&n) => Some(39 + n),
            Self::DispenseLowPressure(n) if LIQUIDS.contains(&n) => Some(49 + n),
            Self::Row0 => Some(60),
            Self::Row1 => Some(61),
            Self::Unknown(v) => Some(v),
            Self::Dispense(_) | Self::Repeat(_) | Self::DispenseLowPressure(_) => None,
        }
    }

    /// Short label as shown on the instrument display.
    pub fn label(&self) -> String {
        match self {
            Self::End => "END".into(),
            Self::AspirateLow => "ASP1".into(),
            Self::AspirateMedium => "ASP2".into(),
            Self::AspirateHigh => "ASP3".into(),
            Self::Dispense(n) => format!("DISP{n}"),
            Self::Soak => "SOAK".into(),
            Self::Repeat(n) => format!("REP{n}"),
            Self::DispenseLowPressure(n) => format!("DISPL{n}"),
            Self::Row0 => "ROW0".into(),
            Self::Row1 => "ROW1".into(),
            Self::Unknown(v) => format!("Unknown({v})"),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One raw command table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CommandEntry {
    /// Opcode byte.
    pub opcode: u8,
    /// Parameter word.
    pub param: u16,
}

impl CommandEntry {
    /// Create an entry. Fails for opcodes that have no byte value.
    pub fn new(opcode: Opcode, param: u16) -> Result<Self> {
        let code = opcode
            .code()
            .ok_or_else(|| Error::InvalidRecord(format!("{opcode} has no opcode byte")))?;
        Ok(Self {
            opcode: code,
            param,
        })
    }

    /// Decoded opcode.
    pub fn opcode(&self) -> Opcode {
        Opcode::from(self.opcode)
    }

    /// Whether this entry terminates the table.
    pub fn is_end(&self) -> bool {
        self.opcode == 0
    }

    /// Typed interpretation, or `None` for `END`.
    pub fn command(&self) -> Option<Command> {
        Command::from_entry(*self)
    }
}

/// Aspiration speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AspirateSpeed {
    /// `ASP1`.
    Low,
    /// `ASP2`.
    Medium,
    /// `ASP3`.
    High,
}

/// A command with its parameter decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Command {
    /// Aspirate for `time_ds` tenths of a second at `height_dmm` tenths of a
    /// millimetre above the well bottom.
    Aspirate {
        /// Pump speed.
        speed: AspirateSpeed,
        /// Duration in 1/10 s (high byte of the parameter).
        time_ds: u8,
        /// Height in 1/10 mm (low byte of the parameter).
        height_dmm: u8,
    },
    /// Dispense a volume of liquid 1-4.
    Dispense {
        /// Liquid channel, 1-4.
        liquid: u8,
        /// Volume in 1/10 µl.
        volume_dul: u16,
        /// Low-pressure dispense (`DISPL`).
        low_pressure: bool,
    },
    /// Wait.
    Soak {
        /// Duration in seconds.
        seconds: u16,
    },
    /// Repeat the commands from `from_command` up to here `count` times.
    Repeat {
        /// Repeat count, 1-10.
        count: u8,
        /// 1-based index of the first repeated command.
        from_command: u16,
    },
    /// Row selection mask.
    RowSelect {
        /// 0 for rows 1-16, 1 for rows 17-32.
        bank: u8,
        /// Bit 0 is the first row of the bank.
        mask: u16,
    },
    /// Opcode without a known meaning; kept as raw data.
    Unrecognized {
        /// Opcode byte.
        opcode: u8,
        /// Parameter word.
        param: u16,
    },
}

impl Command {
    /// Interpret a table entry. Returns `None` for `END`.
    pub fn from_entry(entry: CommandEntry) -> Option<Self> {
        let param = entry.param;
        let [height_dmm, time_ds] = param.to_le_bytes();
        let command = match entry.opcode() {
            Opcode::End => return None,
            Opcode::AspirateLow => Self::Aspirate {
                speed: AspirateSpeed::Low,
                time_ds,
                height_dmm,
            },
            Opcode::AspirateMedium => Self::Aspirate {
                speed: AspirateSpeed::Medium,
                time_ds,
                height_dmm,
            },
            Opcode::AspirateHigh => Self::Aspirate {
                speed: AspirateSpeed::High,
                time_ds,
                height_dmm,
            },
            Opcode::Dispense(liquid) => Self::Dispense {
                liquid,
                volume_dul: param,
                low_pressure: false,
            },
            Opcode::DispenseLowPressure(liquid) => Self::Dispense {
                liquid,
                volume_dul: param,
                low_pressure: true,
            },
            Opcode::Soak => Self::Soak { seconds: param },
            Opcode::Repeat(count) => Self::Repeat {
                count,
                from_command: param,
            },
            Opcode::Row0 => Self::RowSelect { bank: 0, mask: param },
            Opcode::Row1 => Self::RowSelect { bank: 1, mask: param },
            Opcode::Unknown(opcode) => Self::Unrecognized { opcode, param },
        };
        Some(command)
    }

    /// Opcode this command is stored under.
    ///
    /// Out-of-range liquid or repeat numbers yield an opcode without a byte
    /// value; any bank other than 0 maps to `ROW1`.
    pub fn opcode(&self) -> Opcode {
        match *self {
            Self::Aspirate { speed, .. } => match speed {
                AspirateSpeed::Low => Opcode::AspirateLow,
                AspirateSpeed::Medium => Opcode::AspirateMedium,
                AspirateSpeed::High => Opcode::AspirateHigh,
            },
            Self::Dispense {
                liquid,
                low_pressure: true,
                ..
            } => Opcode::DispenseLowPressure(liquid),
            Self::Dispense { liquid, .. } => Opcode::Dispense(liquid),
            Self::Soak { .. } => Opcode::Soak,
            Self::Repeat { count, .. } => Opcode::Repeat(count),
            Self::RowSelect { bank: 0, .. } => Opcode::Row0,
            Self::RowSelect { .. } => Opcode::Row1,
            Self::Unrecognized { opcode, .. } => Opcode::Unknown(opcode),
        }
    }

    /// Encode back into a table entry.
    ///
    /// Liquids must be 1-4, repeat counts 1-10 and row banks 0 or 1;
    /// anything else is [`Error::InvalidRecord`].
    pub fn to_entry(&self) -> Result<CommandEntry> {
        let param = match *self {
            Self::Aspirate {
                time_ds,
                height_dmm,
                ..
            } => u16::from_le_bytes([height_dmm, time_ds]),
            Self::Dispense { volume_dul, .. } => volume_dul,
            Self::Soak { seconds } => seconds,
            Self::Repeat { from_command, .. } => from_command,
            Self::RowSelect { bank, mask } => {
                if bank > 1 {
                    return Err(Error::InvalidRecord(format!("row bank {bank}, expected 0 or 1")));
                }
                mask
            },
            Self::Unrecognized { opcode, param } => return Ok(CommandEntry { opcode, param }),
        };
        CommandEntry::new(self.opcode(), param)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self
            .opcode()
            .label();
        match *self {
            Self::Aspirate {
                time_ds,
                height_dmm,
                ..
            } => write!(
                f,
                "{label:<6} {}.{} s at {}.{} mm",
                time_ds / 10,
                time_ds % 10,
                height_dmm / 10,
                height_dmm % 10
            ),
            Self::Dispense { volume_dul, .. } => {
                write!(f, "{label:<6} {}.{} µl", volume_dul / 10, volume_dul % 10)
            },
            Self::Soak { seconds } => write!(f, "{label:<6} {seconds} s"),
            Self::Repeat { from_command, .. } => write!(f, "{label:<6} from #{from_command}"),
            Self::RowSelect { mask, .. } => write!(f, "{label:<6} {mask:016b}"),
            Self::Unrecognized { param, .. } => write!(f, "{label:<6} 0x{param:04X}"),
        }
    }
}

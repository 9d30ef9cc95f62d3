//! Instrument identity command.

use {
    anyhow::{Context, Result},
    aq3link::{CancelToken, Identity, Instrument, record::format_date},
    console::style,
};

use crate::{Cli, config::Config, get_port, transfer_options};

/// Everything `info` reports.
#[derive(Debug, serde::Serialize)]
struct InfoReport {
    port: String,
    model: String,
    kind: String,
    firmware_version: String,
    #[serde(flatten)]
    identity: Identity,
    program_file: String,
    program_date: String,
}

impl InfoReport {
    fn new(port: String, identity: Identity, program_file: String, program_date: String) -> Self {
        Self {
            port,
            model: identity
                .codes
                .model()
                .to_string(),
            kind: identity
                .codes
                .kind()
                .to_string(),
            firmware_version: identity
                .codes
                .firmware_version(),
            identity,
            program_file,
            program_date: format_date(&program_date),
        }
    }
}

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let serial = get_port(cli, config)?;
    let options = transfer_options(config, false, false);

    if !cli.quiet && !json {
        eprintln!(
            "{} Using port {}",
            style("🔌").cyan(),
            style(&serial.port_name).green()
        );
    }

    let (identity, program_file, program_date) =
        Instrument::with_connection(&serial, &options, &CancelToken::new(), |instrument| {
            let identity = instrument.identify()?;
            let name = instrument.program_name()?;
            let date = instrument.program_date()?;
            Ok((identity, name, date))
        })
        .with_context(|| format!("Failed to query instrument on {}", serial.port_name))?;

    let report = InfoReport::new(serial.port_name, identity, program_file, program_date);

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let codes = &report.identity.codes;
    println!("{}", style("Instrument").bold().underlined());
    println!("  Model:         {} ({:02X})", report.model, codes.model_code);
    println!("  Type:          {} ({:02X})", report.kind, codes.kind_code);
    println!("  Firmware:      {} ({})", report.firmware_version, report.identity.firmware);
    println!("  Serial number: {}", report.identity.serial_number);
    println!("  Program file:  {} ({})", report.program_file, report.program_date);

    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, aq3link::DeviceCodes};

    #[test]
    fn test_info_report_json() {
        let identity = Identity {
            codes: DeviceCodes::from_bytes(&[0x20, 0x20, 0x21]).unwrap(),
            firmware: "Embla V2.1".into(),
            serial_number: "1234".into(),
        };
        let report = InfoReport::new("/dev/ttyS0".into(), identity, "PLATES".into(), "01022003".into());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["model"], "Embla 12384");
        assert_eq!(value["kind"], "Dispenser");
        assert_eq!(value["firmware_version"], "2.1");
        assert_eq!(value["serial_number"], "1234");
        assert_eq!(value["codes"]["model_code"], 0x20);
        assert_eq!(value["program_date"], "01.02.2003");
    }

    #[test]
    fn test_info_report_matches_store_date_format() {
        let identity = Identity {
            codes: DeviceCodes::from_bytes(&[0x20, 0x20, 0x21]).unwrap(),
            firmware: "Embla V2.1".into(),
            serial_number: "1234".into(),
        };
        let report = InfoReport::new("/dev/ttyS0".into(), identity, "PLATES".into(), " 24121998 ".into());
        assert_eq!(report.program_date, "24.12.1998");

        let mut info = [0u8; aq3link::BLOCK_SIZE];
        info[34..42].copy_from_slice(b"24121998");
        assert_eq!(aq3link::InfoBlock::decode(&info).display_date(), report.program_date);
    }
}

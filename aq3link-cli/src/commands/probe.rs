//! Probe for a connected instrument.

use {
    anyhow::{Context, Result},
    aq3link::{CancelToken, Instrument},
    console::style,
};

use crate::{Cli, CliError, config::Config, get_port, transfer_options};

/// Probe command implementation.
///
/// Exits with [`CliError::NoInstrument`] when the line stays silent.
pub(crate) fn cmd_probe(cli: &Cli, config: &Config) -> Result<()> {
    let serial = get_port(cli, config)?;
    let options = transfer_options(config, false, false);

    let found = Instrument::with_connection(&serial, &options, &CancelToken::new(), Instrument::probe)
        .with_context(|| format!("Failed to probe {}", serial.port_name))?;

    match found {
        Some(codes) => {
            println!(
                "{}: {} {} (firmware {})",
                serial.port_name,
                codes.model(),
                codes.kind(),
                codes.firmware_version()
            );
            if !cli.quiet {
                eprintln!(
                    "{} Instrument found",
                    style("✓")
                        .green()
                        .bold()
                );
            }
            Ok(())
        },
        None => Err(CliError::NoInstrument(format!(
            "no instrument answered on {}",
            serial.port_name
        ))
        .into()),
    }
}

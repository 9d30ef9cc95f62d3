//! Program store upload and download.

use {
    anyhow::{Context, Result},
    aq3link::{
        Error, Instrument, ProgramStore,
        record::{blocks_from_image, image_from_blocks},
    },
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    log::warn,
    std::{fs, path::Path, time::Duration},
};

use crate::{
    Cli, commands::show::print_store, config::Config, get_port, install_interrupt_handler,
    transfer_options, use_fancy_output, was_interrupted,
};

/// Progress bar for a transfer of `total` blocks; `0` when unknown.
fn transfer_progress(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    if total == 0 {
        let pb = ProgressBar::new_spinner();
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} blocks {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        return pb;
    }

    let pb = ProgressBar::new(total as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

/// Map a cancelled transfer to a friendlier message.
fn interrupted_context(err: Error, action: &str) -> anyhow::Error {
    match err {
        Error::Cancelled { completed } if was_interrupted() => {
            anyhow::anyhow!("{action} interrupted after {completed} blocks")
        },
        other => anyhow::Error::new(other).context(format!("{action} failed")),
    }
}

/// Upload command implementation.
pub(crate) fn cmd_upload(
    cli: &Cli,
    config: &Config,
    output: Option<&Path>,
    json: bool,
    strict_checksum: bool,
) -> Result<()> {
    let serial = get_port(cli, config)?;
    let options = transfer_options(config, strict_checksum, false);
    let cancel = install_interrupt_handler();

    if !cli.quiet {
        eprintln!(
            "{} Uploading programs from {}",
            style("📥").cyan(),
            style(&serial.port_name).green()
        );
    }

    let pb = transfer_progress(cli, 0);
    let result = Instrument::with_connection(&serial, &options, &cancel, |instrument| {
        instrument.upload_store(&mut |done, _| {
            pb.set_position(done as u64);
        })
    });
    pb.finish_and_clear();
    // Decoded before saving, so an unusable upload never reaches the disk.
    let (store, report) = result.map_err(|e| interrupted_context(e, "Upload"))?;

    for mismatch in &report.checksum_mismatches {
        warn!(
            "Block {} checksum mismatch: expected {:#04x}, got {:#04x}",
            mismatch.block, mismatch.expected, mismatch.actual
        );
    }

    if let Some(path) = output {
        fs::write(path, image_from_blocks(&report.blocks))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} Saved {} blocks to {}",
                style("✓")
                    .green()
                    .bold(),
                report.blocks.len(),
                style(path.display()).yellow()
            );
        }
    }

    if json || output.is_none() {
        print_store(&store, json)?;
    }
    Ok(())
}

/// Download command implementation.
///
/// The image is sent as stored; a partial write leaves the instrument with
/// an incomplete program store, so it is reported as such.
pub(crate) fn cmd_download(
    cli: &Cli,
    config: &Config,
    file: &Path,
    continue_on_timeout: bool,
) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let blocks = blocks_from_image(&data)
        .with_context(|| format!("{} is not a program image", file.display()))?;
    ProgramStore::from_blocks(&blocks)?.validate()?;

    let serial = get_port(cli, config)?;
    let options = transfer_options(config, false, continue_on_timeout);
    let cancel = install_interrupt_handler();

    if !cli.quiet {
        eprintln!(
            "{} Downloading {} blocks to {}",
            style("📤").cyan(),
            blocks.len(),
            style(&serial.port_name).green()
        );
    }

    let pb = transfer_progress(cli, blocks.len());
    let result = Instrument::with_connection(&serial, &options, &cancel, |instrument| {
        instrument.download_programs(&blocks, &mut |done, _| {
            pb.set_position(done as u64);
        })
    });
    pb.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if e.is_partial_write() {
                warn!("The instrument now holds an incomplete program store");
            }
            return Err(interrupted_context(e, "Download"));
        },
    };

    if !report.reset_acknowledged {
        warn!("Reset was not acknowledged");
    }
    if !report
        .unacknowledged
        .is_empty()
    {
        warn!(
            "{} blocks were not acknowledged: {:?}",
            report
                .unacknowledged
                .len(),
            report.unacknowledged
        );
    }

    if !cli.quiet {
        let mark = if report.is_clean() {
            style("✓").green()
        } else {
            style("⚠").yellow()
        };
        eprintln!(
            "{} Wrote {} blocks",
            mark.bold(),
            report.blocks_written
        );
    }
    Ok(())
}

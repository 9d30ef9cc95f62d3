//! aq3link CLI - Command-line tool for AquaMax and Embla instruments.
//!
//! ## Features
//!
//! - Read instrument identity (model, type, firmware, serial number)
//! - Probe a port for a connected instrument
//! - Upload the program store to a raw image file
//! - Download a raw image back to the instrument
//! - Show the programs stored in an image file
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::Result,
    aq3link::{CancelToken, SerialConfig, TransferOptions},
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    std::{
        env,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
    },
};

mod commands;
mod config;

use {
    commands::{
        completions::cmd_completions,
        info::cmd_info,
        ports::cmd_list_ports,
        probe::cmd_probe,
        show::cmd_show,
        transfer::{cmd_download, cmd_upload},
    },
    config::Config,
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Missing or malformed arguments (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Nothing answered on the port (exit code 3).
    #[error("{0}")]
    NoInstrument(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::NoInstrument(_) => 3,
        }
    }
}

/// aq3link - Program transfer for AquaMax and Embla plate washers and dispensers.
///
/// Environment variables:
///   AQ3LINK_PORT  - Default serial port (number 1-10 or device path)
#[derive(Parser)]
#[command(name = "aq3link")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port: a number 1-10 or a device path.
    #[arg(short, long, global = true, env = "AQ3LINK_PORT")]
    pub(crate) port: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Read model, type, firmware and serial number.
    Info {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check whether an instrument answers on the port.
    Probe,

    /// Read the program store from the instrument.
    Upload {
        /// Save the raw image to this file.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output the decoded programs as JSON.
        #[arg(long)]
        json: bool,

        /// Fail on the first block with a bad checksum.
        #[arg(long)]
        strict_checksum: bool,
    },

    /// Replace the instrument's program store with a raw image.
    Download {
        /// Raw image file.
        file: PathBuf,

        /// Keep sending blocks when one is not acknowledged.
        #[arg(long)]
        continue_on_timeout: bool,
    },

    /// Show the programs in a raw image file.
    Show {
        /// Raw image file.
        file: PathBuf,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!(
            "{} {err:#}",
            style("Error:")
                .red()
                .bold()
        );
        let code = err
            .downcast_ref::<CliError>()
            .map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "aq3link v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Info { json } => cmd_info(&cli, &config, *json),
        Commands::Probe => cmd_probe(&cli, &config),
        Commands::Upload {
            output,
            json,
            strict_checksum,
        } => cmd_upload(
            &cli,
            &config,
            output.as_deref(),
            *json,
            *strict_checksum,
        ),
        Commands::Download {
            file,
            continue_on_timeout,
        } => cmd_download(&cli, &config, file, *continue_on_timeout),
        Commands::Show { file, json } => cmd_show(file, *json),
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Resolve the serial port from the command line or the config file.
pub(crate) fn get_port(cli: &Cli, config: &Config) -> Result<SerialConfig> {
    let port = cli
        .port
        .clone()
        .or_else(|| {
            config
                .connection
                .port
                .clone()
        })
        .ok_or_else(|| {
            CliError::Usage(
                "no serial port given; use --port, AQ3LINK_PORT or the config file".into(),
            )
        })?;

    SerialConfig::from_port_arg(&port)
        .map_err(|e| CliError::Usage(format!("invalid port {port:?}: {e}")).into())
}

/// Install the Ctrl-C handler and return the token it cancels.
///
/// Transfers check the token between blocks.
pub(crate) fn install_interrupt_handler() -> CancelToken {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        INTERRUPTED.store(true, Ordering::Relaxed);
        handler_token.cancel();
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    cancel
}

/// Transfer options from the config file with command-line overrides.
pub(crate) fn transfer_options(
    config: &Config,
    strict_checksum: bool,
    continue_on_timeout: bool,
) -> TransferOptions {
    let mut options = config.transfer_options();
    if strict_checksum {
        options.checksum_policy = aq3link::ChecksumPolicy::Strict;
    }
    if continue_on_timeout {
        options.ack_timeout_policy = aq3link::AckTimeoutPolicy::Continue;
    }
    options
}

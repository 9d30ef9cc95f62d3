//! Configuration file support for aq3link.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (AQ3LINK_*)
//! 3. Local config file (./aq3link.toml)
//! 4. Global config file (~/.config/aq3link/config.toml)

use {
    aq3link::{AckTimeoutPolicy, ChecksumPolicy, TransferOptions},
    directories::ProjectDirs,
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "aq3link.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port: a number 1-10 or a device path.
    pub port: Option<String>,
}

/// Transfer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Budget for one acknowledgement, in milliseconds.
    pub ack_timeout_ms: Option<u64>,
    /// Delay between acknowledgement polls, in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Fail uploads on a checksum mismatch.
    pub strict_checksum: Option<bool>,
    /// Keep sending blocks when one is not acknowledged.
    pub continue_on_ack_timeout: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "aq3link").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other
            .connection
            .port
            .is_some()
        {
            self.connection.port = other.connection.port;
        }

        if other
            .transfer
            .ack_timeout_ms
            .is_some()
        {
            self.transfer.ack_timeout_ms = other.transfer.ack_timeout_ms;
        }
        if other
            .transfer
            .poll_interval_ms
            .is_some()
        {
            self.transfer.poll_interval_ms = other.transfer.poll_interval_ms;
        }
        if other
            .transfer
            .strict_checksum
            .is_some()
        {
            self.transfer.strict_checksum = other.transfer.strict_checksum;
        }
        if other
            .transfer
            .continue_on_ack_timeout
            .is_some()
        {
            self.transfer.continue_on_ack_timeout = other.transfer.continue_on_ack_timeout;
        }
    }

    /// Transfer options with the configured overrides applied.
    pub fn transfer_options(&self) -> TransferOptions {
        let mut options = TransferOptions::default();
        if let Some(ms) = self.transfer.ack_timeout_ms {
            options.ack_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.transfer.poll_interval_ms {
            options.poll_interval = Duration::from_millis(ms);
        }
        if self.transfer.strict_checksum == Some(true) {
            options.checksum_policy = ChecksumPolicy::Strict;
        }
        if self.transfer.continue_on_ack_timeout == Some(true) {
            options.ack_timeout_policy = AckTimeoutPolicy::Continue;
        }
        options
    }
}

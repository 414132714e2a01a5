//! Configuration management for Stitch.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/stitch/config.toml` |
//! | macOS | `~/Library/Application Support/dev.stitch.Stitch/config.toml` |
//! | Windows | `%APPDATA%\stitch\Stitch\config\config.toml` |
//!
//! ## Example
//!
//! ```toml
//! [server]
//! port = 8443
//!
//! [transfer]
//! idle_timeout = "10m"
//!
//! [storage]
//! output_dir = "assemble"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Stitch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Transfer lifecycle settings
    pub transfer: TransferConfig,
    /// Artifact storage settings
    pub storage: StorageConfig,
    /// Access log settings
    pub access_log: AccessLogConfig,
    /// Sender settings
    pub client: ClientConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening port
    pub port: u16,
    /// Bind to 127.0.0.1 instead of all interfaces
    pub localhost_only: bool,
    /// Largest accepted chunk body in bytes
    pub max_chunk_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            localhost_only: false,
            max_chunk_bytes: 2 * crate::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Transfer lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Inactivity after which an unfinished transfer is failed
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// How often idle transfers are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// How long finished transfers are remembered to reject late chunks
    #[serde(with = "humantime_serde")]
    pub retain_finished: Duration,
    /// Concurrent unfinished transfers (0 = unlimited)
    pub max_active_transfers: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            retain_finished: Duration::from_secs(300),
            max_active_transfers: 256,
        }
    }
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory assembled files are written to
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("assemble"),
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Write an access log line per ingestion request
    pub enabled: bool,
    /// Directory holding `access.log`
    pub dir: PathBuf,
    /// Lines buffered before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("logs"),
            queue_capacity: 1024,
        }
    }
}

/// Sender configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the receiving server
    pub server_url: String,
    /// Chunk size in bytes
    pub chunk_size: usize,
    /// Chunks in flight per file
    pub parallel_chunks: usize,
    /// Accept self-signed certificates
    pub accept_invalid_certs: bool,
    /// Assembly retries after the server reports a storage failure
    pub assembly_retries: u32,
    /// Send a unique `Transfer-Id` with every file
    pub use_transfer_id: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://localhost:{}", crate::DEFAULT_PORT),
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            parallel_chunks: crate::DEFAULT_PARALLEL_CHUNKS,
            accept_invalid_certs: false,
            assembly_retries: 3,
            use_transfer_id: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Falls back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Reject values the server or sender cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_chunk_bytes == 0 {
            return Err(Error::ConfigError(
                "server.max_chunk_bytes must be greater than zero".into(),
            ));
        }
        if self.client.chunk_size == 0 {
            return Err(Error::ConfigError(
                "client.chunk_size must be greater than zero".into(),
            ));
        }
        if self.client.parallel_chunks == 0 {
            return Err(Error::ConfigError(
                "client.parallel_chunks must be greater than zero".into(),
            ));
        }
        if self.transfer.sweep_interval.is_zero() {
            return Err(Error::ConfigError(
                "transfer.sweep_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "stitch", "Stitch")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid duration '{s}', expected e.g. 30s, 5m, 1h"))
        })
    }

    pub(super) fn parse(s: &str) -> Option<Duration> {
        let split = s.find(|c: char| !c.is_ascii_digit())?;
        let (value, unit) = s.split_at(split);
        let value: u64 = value.parse().ok()?;
        let secs = match unit {
            "s" => value,
            "m" => value.checked_mul(60)?,
            "h" => value.checked_mul(3600)?,
            _ => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use stitch_core::config::Config;

/// Load configuration with graceful fallback to defaults.
///
/// An explicit `--config` path must exist and parse; the default location
/// falls back to defaults when missing or broken.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from(path)?),
        None => Ok(Config::load().unwrap_or_else(|e| {
            tracing::warn!("Ignoring configuration: {}", e);
            Config::default()
        })),
    }
}

pub mod config;
pub mod send;
pub mod serve;

/// Stitch - chunked file upload and reassembly
#[derive(Parser)]
#[command(name = "stitch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Receive chunks over HTTP and assemble them into files
    Serve(ServeArgs),

    /// Split files into chunks and upload them
    Send(SendArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "STITCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind to localhost only
    #[arg(long)]
    pub localhost_only: bool,

    /// Directory assembled files are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for the access log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Disable the access log
    #[arg(long)]
    pub no_access_log: bool,
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "STITCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server base URL
    #[arg(short, long, env = "STITCH_SERVER")]
    pub server: Option<String>,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Chunks in flight per file
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all configuration
    Show {
        /// Configuration file to show instead of the default one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Where to write it (defaults to the platform config directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

//! Stitch CLI - chunked file upload and reassembly
//!
//! ## Quick Start
//!
//! ```bash
//! # Receive chunks and write assembled files to ./assemble
//! stitch serve
//!
//! # Upload files in 5 MB chunks
//! stitch send ./video.mp4 ./notes.txt --server http://receiver:8443
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Send(args) => commands::send::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,stitch=info,stitch_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

//! # Stitch Core Library
//!
//! `stitch-core` reassembles files that arrive as independently uploaded
//! chunks. Chunks may arrive out of order, concurrently, more than once, or
//! for many files at the same time; each file is written exactly once, byte
//! for byte, as soon as its last missing chunk lands.
//!
//! ## Modules
//!
//! - [`transfer`] - Chunk collection, completion detection and assembly
//! - [`sink`] - Destinations for assembled files
//! - [`mod@file`] - Splitting files into chunks, artifact name validation
//! - [`protocol`] - Upload headers and endpoint paths
//! - [`access_log`] - Best-effort request log
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`web`] - HTTP ingestion endpoint (feature `web`)
//! - [`client`] - Chunk uploader (feature `client`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stitch_core::config::TransferConfig;
//! use stitch_core::sink::FsSink;
//! use stitch_core::transfer::{Collector, IncomingChunk};
//!
//! let collector = Collector::new(Arc::new(FsSink::new("assemble")), TransferConfig::default());
//! collector.ingest(IncomingChunk::new("notes.txt", 1, 2, b"world".to_vec())).await?;
//! let report = collector.ingest(IncomingChunk::new("notes.txt", 0, 2, b"hello ".to_vec())).await?;
//! assert!(report.is_complete());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod access_log;
pub mod config;
pub mod error;
pub mod file;
pub mod protocol;
pub mod sink;
pub mod transfer;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "web")]
pub mod web;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8443;

/// Default chunk size for uploads (5 MB)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default number of chunks in flight per file
pub const DEFAULT_PARALLEL_CHUNKS: usize = 4;

//! Destinations for assembled artifacts.
//!
//! The [`Sink`] trait is object safe so the collector can hold an
//! `Arc<dyn Sink>`. [`FsSink`] writes into an output directory,
//! [`MemorySink`] keeps artifacts in memory.

mod fs;
mod memory;

pub use fs::FsSink;
pub use memory::MemorySink;

use std::future::Future;
use std::io;
use std::pin::Pin;

/// Boxed future returned by [`Sink`] methods.
pub type SinkFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// Storage for assembled artifacts, addressed by name.
///
/// Names are plain file names; implementations reject anything else with
/// [`io::ErrorKind::InvalidInput`]. Missing artifacts are reported with
/// [`io::ErrorKind::NotFound`].
pub trait Sink: Send + Sync {
    /// Store an artifact, replacing any previous one with the same name.
    ///
    /// Readers never observe a partially written artifact.
    fn write<'a>(&'a self, name: &'a str, bytes: Vec<u8>) -> SinkFuture<'a, ()>;

    /// Read a whole artifact.
    fn read<'a>(&'a self, name: &'a str) -> SinkFuture<'a, Vec<u8>>;

    /// Append bytes to an existing artifact, returning its new size.
    fn append<'a>(&'a self, name: &'a str, bytes: Vec<u8>) -> SinkFuture<'a, u64>;

    /// Delete an artifact.
    fn remove<'a>(&'a self, name: &'a str) -> SinkFuture<'a, ()>;
}

fn check_name(name: &str) -> io::Result<()> {
    crate::file::validate_artifact_name(name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
}

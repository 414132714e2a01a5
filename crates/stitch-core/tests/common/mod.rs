//! Common test utilities for `Stitch` integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::SliceRandom;

use stitch_core::config::TransferConfig;
use stitch_core::file::FileChunker;
use stitch_core::sink::{MemorySink, Sink};
use stitch_core::transfer::{Collector, IncomingChunk};

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &std::path::Path, path2: &std::path::Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Split `data` the way a sender would.
pub fn split(name: &str, data: &[u8], chunk_size: usize) -> Vec<IncomingChunk> {
    FileChunker::new(chunk_size)
        .split_bytes(data)
        .into_iter()
        .map(|c| IncomingChunk::new(name, c.index, c.total, c.data))
        .collect()
}

/// Split and shuffle.
pub fn split_shuffled(name: &str, data: &[u8], chunk_size: usize) -> Vec<IncomingChunk> {
    let mut chunks = split(name, data, chunk_size);
    chunks.shuffle(&mut rand::thread_rng());
    chunks
}

/// A collector backed by a fresh in-memory sink.
pub fn memory_collector() -> (Arc<Collector>, Arc<MemorySink>) {
    memory_collector_with(TransferConfig::default())
}

/// A collector with custom lifecycle settings backed by an in-memory sink.
pub fn memory_collector_with(config: TransferConfig) -> (Arc<Collector>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let collector = Arc::new(Collector::new(Arc::clone(&sink) as Arc<dyn Sink>, config));
    (collector, sink)
}

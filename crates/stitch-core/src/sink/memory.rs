use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{check_name, Sink, SinkFuture};

/// Keeps artifacts in memory.
///
/// Used by tests and embedders that consume artifacts directly. Writes can be
/// made to fail on demand with [`MemorySink::fail_next_writes`].
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
    fail_writes: AtomicUsize,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a stored artifact.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all stored artifacts, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn store(&self, name: &str, bytes: Vec<u8>) -> io::Result<()> {
        check_name(name)?;
        if self.take_failure() {
            return Err(io::Error::other("injected write failure"));
        }
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, name: &str) -> io::Result<Vec<u8>> {
        check_name(name)?;
        self.get(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }

    fn extend(&self, name: &str, bytes: &[u8]) -> io::Result<u64> {
        check_name(name)?;
        let mut artifacts = self
            .artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let existing = artifacts
            .get_mut(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        existing.extend_from_slice(bytes);
        Ok(existing.len() as u64)
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        check_name(name)?;
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

impl Sink for MemorySink {
    fn write<'a>(&'a self, name: &'a str, bytes: Vec<u8>) -> SinkFuture<'a, ()> {
        Box::pin(async move { self.store(name, bytes) })
    }

    fn read<'a>(&'a self, name: &'a str) -> SinkFuture<'a, Vec<u8>> {
        Box::pin(async move { self.load(name) })
    }

    fn append<'a>(&'a self, name: &'a str, bytes: Vec<u8>) -> SinkFuture<'a, u64> {
        Box::pin(async move { self.extend(name, &bytes) })
    }

    fn remove<'a>(&'a self, name: &'a str) -> SinkFuture<'a, ()> {
        Box::pin(async move { self.delete(name) })
    }
}

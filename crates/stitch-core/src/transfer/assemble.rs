//! Reassembly of a completed transfer into one artifact.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::ChunkRecord;
use crate::error::{Error, Result};
use crate::sink::Sink;

/// Read-only view of a transfer whose chunks are all present.
#[derive(Debug, Clone, Copy)]
pub struct AssemblySnapshot<'a> {
    key: &'a str,
    file_name: &'a str,
    total_chunks: u64,
    chunks: &'a BTreeMap<u64, ChunkRecord>,
}

impl<'a> AssemblySnapshot<'a> {
    /// Build a snapshot over a chunk map.
    #[must_use]
    pub const fn new(
        key: &'a str,
        file_name: &'a str,
        total_chunks: u64,
        chunks: &'a BTreeMap<u64, ChunkRecord>,
    ) -> Self {
        Self {
            key,
            file_name,
            total_chunks,
            chunks,
        }
    }

    /// Transfer identity.
    #[must_use]
    pub const fn key(&self) -> &'a str {
        self.key
    }

    /// Artifact name.
    #[must_use]
    pub const fn file_name(&self) -> &'a str {
        self.file_name
    }

    /// Concatenate payloads in ascending index order.
    ///
    /// Fails with [`Error::MissingChunk`] naming the first absent index.
    pub fn concat(&self) -> Result<Vec<u8>> {
        let size: usize = self.chunks.values().map(|c| c.payload.len()).sum();
        let mut out = Vec::with_capacity(size);

        for index in 0..self.total_chunks {
            let record = self.chunks.get(&index).ok_or_else(|| Error::MissingChunk {
                transfer: self.key.to_string(),
                index,
            })?;
            out.extend_from_slice(&record.payload);
        }

        Ok(out)
    }
}

/// An artifact written to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledArtifact {
    /// Artifact name in the sink
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

/// Concatenates completed transfers and hands them to a [`Sink`].
#[derive(Clone)]
pub struct Assembler {
    sink: Arc<dyn Sink>,
}

impl Assembler {
    /// Create an assembler writing to the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }

    /// The sink artifacts are written to.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// Assemble the snapshot and persist it under its file name.
    ///
    /// Nothing is written when a chunk is missing.
    pub async fn assemble(&self, snapshot: AssemblySnapshot<'_>) -> Result<AssembledArtifact> {
        let bytes = snapshot.concat()?;
        let size = bytes.len() as u64;
        let name = snapshot.file_name().to_string();

        self.sink
            .write(&name, bytes)
            .await
            .map_err(|e| Error::SinkWriteFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            transfer = %snapshot.key(),
            file = %name,
            size,
            chunks = snapshot.total_chunks,
            "Assembled artifact"
        );

        Ok(AssembledArtifact { name, size })
    }
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler").finish_non_exhaustive()
    }
}

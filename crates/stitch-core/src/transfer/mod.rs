//! Chunk collection and reassembly engine.
//!
//! This module holds the receiver-side state machine for chunked uploads:
//!
//! - [`TransferState`] accumulates the chunks of one transfer
//! - [`registry::Registry`] maps transfer identities to their state
//! - [`collector::Collector`] ties insertion, completion and assembly together
//! - [`assemble::Assembler`] concatenates a finished transfer and persists it
//!
//! ## Locking
//!
//! Every transfer owns its own `tokio::sync::Mutex`. The registry lock is only
//! held to look up, create or archive an entry, so unrelated transfers never
//! wait on each other. Insertion, the completion check and the transition to
//! [`TransferStatus::Assembling`] all happen under the per-transfer lock.

pub mod assemble;
pub mod collector;
pub mod registry;

pub use assemble::{AssembledArtifact, Assembler, AssemblySnapshot};
pub use collector::{Collector, IngestReport, SweeperHandle};
pub use registry::{Registry, SweepReport};

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Lifecycle of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Accepting chunks
    Collecting,
    /// All chunks present, artifact being written
    Assembling,
    /// Artifact written
    Complete,
    /// Transfer ended without an artifact
    Failed,
}

impl TransferStatus {
    /// Returns `true` once no further chunks can be accepted.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        !matches!(self, Self::Collecting)
    }

    /// Returns `true` for `Complete` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collecting => write!(f, "collecting"),
            Self::Assembling => write!(f, "assembling"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One chunk as delivered by a sender, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingChunk {
    /// Explicit transfer id, if the sender supplied one
    pub transfer_id: Option<String>,
    /// Name of the artifact being uploaded
    pub file_name: String,
    /// Position of this chunk, starting at 0
    pub index: u64,
    /// Number of chunks in the whole transfer
    pub total_chunks: u64,
    /// Raw chunk bytes
    pub payload: Vec<u8>,
}

impl IncomingChunk {
    /// Create a chunk keyed by its file name.
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        index: u64,
        total_chunks: u64,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            transfer_id: None,
            file_name: file_name.into(),
            index,
            total_chunks,
            payload: payload.into(),
        }
    }

    /// Key this chunk by an explicit transfer id instead of the file name.
    #[must_use]
    pub fn with_transfer_id(mut self, transfer_id: impl Into<String>) -> Self {
        self.transfer_id = Some(transfer_id.into());
        self
    }

    /// The identity this chunk is grouped under.
    #[must_use]
    pub fn key(&self) -> &str {
        self.transfer_id.as_deref().unwrap_or(&self.file_name)
    }

    /// Check the positional metadata and payload rules.
    ///
    /// An empty payload is only valid for the single chunk of a zero-length
    /// file (`total_chunks == 1`).
    pub fn validate(&self) -> Result<()> {
        if self.transfer_id.as_deref().is_some_and(str::is_empty) {
            return Err(Error::Validation("transfer id must not be empty".into()));
        }
        crate::file::validate_artifact_name(&self.file_name)?;

        if self.total_chunks == 0 {
            return Err(Error::Validation(
                "total chunk count must be greater than zero".into(),
            ));
        }
        if self.index >= self.total_chunks {
            return Err(Error::Validation(format!(
                "chunk index {} out of range for {} chunks",
                self.index, self.total_chunks
            )));
        }
        if self.payload.is_empty() && self.total_chunks != 1 {
            return Err(Error::Validation(format!(
                "chunk {} has an empty payload",
                self.index
            )));
        }
        Ok(())
    }
}

/// A stored chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Position within the transfer
    pub index: u64,
    /// Chunk bytes
    pub payload: Vec<u8>,
}

/// Result of a successful insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    /// Distinct chunks held after this insertion
    pub received_count: u64,
    /// Chunk count fixed for the transfer
    pub total_chunks: u64,
    /// `true` only for the insertion that completed the transfer
    pub just_completed: bool,
    /// `true` when the chunk was an identical re-delivery
    pub duplicate: bool,
}

/// Serializable view of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    /// Transfer identity
    pub key: String,
    /// Artifact name
    pub file_name: String,
    /// Current status
    pub status: TransferStatus,
    /// Chunk count fixed for the transfer
    pub total_chunks: u64,
    /// Distinct chunks received
    pub received_chunks: u64,
    /// Payload bytes received
    pub received_bytes: u64,
    /// Reason the transfer failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Accumulated state of one transfer.
///
/// Mutated only while its owner holds the per-transfer lock.
#[derive(Debug)]
pub struct TransferState {
    key: String,
    file_name: String,
    total_chunks: u64,
    received: BTreeMap<u64, ChunkRecord>,
    received_bytes: u64,
    status: TransferStatus,
    failure: Option<String>,
    last_activity: Instant,
}

impl TransferState {
    /// Create an empty transfer whose chunk count is fixed by its first chunk.
    #[must_use]
    pub fn new(key: impl Into<String>, file_name: impl Into<String>, total_chunks: u64) -> Self {
        Self {
            key: key.into(),
            file_name: file_name.into(),
            total_chunks,
            received: BTreeMap::new(),
            received_bytes: 0,
            status: TransferStatus::Collecting,
            failure: None,
            last_activity: Instant::now(),
        }
    }

    /// Store a chunk and decide whether it completed the transfer.
    ///
    /// The completing insertion also moves the transfer to
    /// [`TransferStatus::Assembling`], so at most one caller ever sees
    /// `just_completed == true`.
    ///
    /// A chunk declaring a different chunk count or file name fails the whole
    /// transfer; chunks already stored are left as they are.
    pub fn insert(&mut self, chunk: IncomingChunk) -> Result<InsertOutcome> {
        if self.status.is_closed() {
            return Err(Error::LateChunk {
                transfer: self.key.clone(),
                status: self.status,
            });
        }

        if chunk.total_chunks != self.total_chunks {
            let detail = format!(
                "declared {} chunks, transfer has {}",
                chunk.total_chunks, self.total_chunks
            );
            self.fail(detail.clone());
            return Err(Error::ProtocolMismatch {
                transfer: self.key.clone(),
                detail,
            });
        }

        if chunk.file_name != self.file_name {
            let detail = format!(
                "declared file name '{}', transfer has '{}'",
                chunk.file_name, self.file_name
            );
            self.fail(detail.clone());
            return Err(Error::ProtocolMismatch {
                transfer: self.key.clone(),
                detail,
            });
        }

        if chunk.index >= self.total_chunks {
            return Err(Error::Validation(format!(
                "chunk index {} out of range for {} chunks",
                chunk.index, self.total_chunks
            )));
        }

        self.last_activity = Instant::now();

        let duplicate = match self.received.entry(chunk.index) {
            Entry::Occupied(existing) => {
                if existing.get().payload != chunk.payload {
                    return Err(Error::DuplicateMismatch {
                        transfer: self.key.clone(),
                        index: chunk.index,
                    });
                }
                true
            }
            Entry::Vacant(slot) => {
                self.received_bytes += chunk.payload.len() as u64;
                slot.insert(ChunkRecord {
                    index: chunk.index,
                    payload: chunk.payload,
                });
                false
            }
        };

        let received_count = self.received.len() as u64;
        let just_completed = !duplicate && received_count == self.total_chunks;
        if just_completed {
            self.status = TransferStatus::Assembling;
        }

        Ok(InsertOutcome {
            received_count,
            total_chunks: self.total_chunks,
            just_completed,
            duplicate,
        })
    }

    /// Immutable view of the chunks for assembly.
    ///
    /// Only available while the transfer is assembling.
    pub fn snapshot(&self) -> Result<AssemblySnapshot<'_>> {
        if self.status != TransferStatus::Assembling {
            return Err(Error::InvalidState {
                transfer: self.key.clone(),
                status: self.status,
            });
        }
        Ok(AssemblySnapshot::new(
            &self.key,
            &self.file_name,
            self.total_chunks,
            &self.received,
        ))
    }

    /// Mark the artifact as written and release the chunk payloads.
    pub fn mark_complete(&mut self) {
        self.status = TransferStatus::Complete;
        self.received.clear();
        self.last_activity = Instant::now();
    }

    /// End the transfer without an artifact.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = TransferStatus::Failed;
        self.failure = Some(reason.into());
        self.last_activity = Instant::now();
    }

    /// Transfer identity.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Artifact name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TransferStatus {
        self.status
    }

    /// Chunk count fixed for the transfer.
    #[must_use]
    pub const fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Distinct chunks currently held.
    #[must_use]
    pub fn received_count(&self) -> u64 {
        self.received.len() as u64
    }

    /// Returns `true` if the given index has been stored.
    #[must_use]
    pub fn has_chunk(&self, index: u64) -> bool {
        self.received.contains_key(&index)
    }

    /// When the transfer last changed.
    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Serializable view of the transfer.
    #[must_use]
    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            key: self.key.clone(),
            file_name: self.file_name.clone(),
            status: self.status,
            total_chunks: self.total_chunks,
            received_chunks: self.received_count(),
            received_bytes: self.received_bytes,
            failure: self.failure.clone(),
        }
    }
}

//! Chunk ingestion and the completion trigger.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::assemble::{AssembledArtifact, Assembler};
use super::registry::{Registry, SweepReport};
use super::{IncomingChunk, InsertOutcome, TransferState, TransferStatus, TransferSummary};
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::sink::Sink;

/// Result of ingesting one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Transfer identity
    pub key: String,
    /// Insertion result
    pub outcome: InsertOutcome,
    /// Written artifact, present only for the completing chunk
    pub artifact: Option<AssembledArtifact>,
}

impl IngestReport {
    /// Returns `true` if this chunk completed and assembled its transfer.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Accepts chunks, detects completion and runs assembly.
///
/// Completion is decided under the transfer's own lock and assembly runs
/// before that lock is released, so each transfer is assembled exactly once
/// no matter how many final chunks race.
#[derive(Debug)]
pub struct Collector {
    registry: Registry,
    assembler: Assembler,
    config: TransferConfig,
}

impl Collector {
    /// Create a collector writing artifacts to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>, config: TransferConfig) -> Self {
        Self {
            registry: Registry::new(config.max_active_transfers),
            assembler: Assembler::new(sink),
            config,
        }
    }

    /// The transfer registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The sink artifacts are written to.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn Sink> {
        self.assembler.sink()
    }

    /// Lifecycle settings in effect.
    #[must_use]
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Store a chunk, and assemble its transfer if this chunk completed it.
    ///
    /// Errors are scoped to the chunk's own transfer. A
    /// [`Error::SinkWriteFailed`] leaves the transfer assembling with all of
    /// its chunks so [`Collector::retry_assembly`] can finish it.
    pub async fn ingest(&self, chunk: IncomingChunk) -> Result<IngestReport> {
        chunk.validate()?;
        let index = chunk.index;

        let handle = match self.registry.get_or_create(&chunk).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::debug!(transfer = %chunk.key(), index, error = %e, "Chunk refused");
                return Err(e);
            }
        };
        let mut state = handle.lock().await;

        let outcome = match state.insert(chunk) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_rejection(&state, index, &e).await;
                return Err(e);
            }
        };

        tracing::debug!(
            transfer = %state.key(),
            index,
            received = outcome.received_count,
            total = outcome.total_chunks,
            duplicate = outcome.duplicate,
            "Stored chunk"
        );

        let artifact = if outcome.just_completed {
            Some(self.assemble(&mut state).await?)
        } else {
            None
        };

        Ok(IngestReport {
            key: state.key().to_string(),
            outcome,
            artifact,
        })
    }

    /// Re-run assembly for a transfer stuck after a sink failure.
    pub async fn retry_assembly(&self, key: &str) -> Result<AssembledArtifact> {
        let Some(handle) = self.registry.get(key).await else {
            return Err(match self.registry.archived_summary(key).await {
                Some(summary) => Error::InvalidState {
                    transfer: key.to_string(),
                    status: summary.status,
                },
                None => Error::TransferNotFound(key.to_string()),
            });
        };

        let mut state = handle.lock().await;
        if state.status() != TransferStatus::Assembling {
            return Err(Error::InvalidState {
                transfer: key.to_string(),
                status: state.status(),
            });
        }

        tracing::info!(transfer = %key, "Retrying assembly");
        self.assemble(&mut state).await
    }

    /// Summary of a transfer, active or recently finished.
    pub async fn summary(&self, key: &str) -> Result<TransferSummary> {
        self.registry
            .summary(key)
            .await
            .ok_or_else(|| Error::TransferNotFound(key.to_string()))
    }

    /// Expire idle transfers and prune old tombstones once.
    pub async fn sweep(&self) -> SweepReport {
        let report = self
            .registry
            .sweep(self.config.idle_timeout, self.config.retain_finished)
            .await;
        if !report.expired.is_empty() || report.pruned > 0 {
            tracing::debug!(
                expired = report.expired.len(),
                pruned = report.pruned,
                "Swept transfers"
            );
        }
        report
    }

    /// Run [`Collector::sweep`] every `sweep_interval` until stopped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let collector = Arc::clone(self);
        let interval = self.config.sweep_interval.max(Duration::from_millis(10));

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        collector.sweep().await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Sweeper received shutdown signal");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx, task }
    }

    async fn assemble(&self, state: &mut TransferState) -> Result<AssembledArtifact> {
        let result = self.assembler.assemble(state.snapshot()?).await;

        match result {
            Ok(artifact) => {
                state.mark_complete();
                self.registry.archive(state).await;
                Ok(artifact)
            }
            Err(e) if e.is_terminal() => {
                tracing::error!(transfer = %state.key(), error = %e, "Assembly failed");
                state.fail(e.to_string());
                self.registry.archive(state).await;
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    transfer = %state.key(),
                    error = %e,
                    "Assembly could not be stored, transfer kept for retry"
                );
                Err(e)
            }
        }
    }

    async fn record_rejection(&self, state: &TransferState, index: u64, error: &Error) {
        match error {
            _ if error.is_terminal() => {
                tracing::warn!(transfer = %state.key(), index, error = %error, "Transfer failed");
                self.registry.archive(state).await;
            }
            Error::LateChunk { .. } => {
                tracing::debug!(transfer = %state.key(), index, "Late chunk ignored");
            }
            _ => {
                tracing::warn!(transfer = %state.key(), index, error = %error, "Chunk rejected");
            }
        }
    }
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::warn!("Sweeper task ended abnormally: {}", e);
        }
    }
}

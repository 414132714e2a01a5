//! Registry of in-flight and recently finished transfers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{IncomingChunk, TransferState, TransferSummary};
use crate::error::{Error, Result};

/// Shared handle to one transfer's state.
pub type TransferHandle = Arc<Mutex<TransferState>>;

/// A finished transfer kept around so late chunks are recognized.
#[derive(Debug, Clone)]
struct Tombstone {
    summary: TransferSummary,
    archived_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    active: HashMap<String, TransferHandle>,
    archived: HashMap<String, Tombstone>,
}

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Idle transfers that were failed and archived
    pub expired: Vec<String>,
    /// Tombstones dropped after their retention window
    pub pruned: usize,
}

/// Maps transfer identities to their state.
///
/// Each identity has exactly one live [`TransferState`]. Once a transfer
/// reaches `Complete` or `Failed` it is moved to the archive, where only its
/// summary is kept until the retention window passes.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Inner>,
    max_active: usize,
}

impl Registry {
    /// Create a registry accepting at most `max_active` concurrent transfers.
    ///
    /// `0` means unlimited.
    #[must_use]
    pub fn new(max_active: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_active,
        }
    }

    /// Find the transfer a chunk belongs to, creating it on first contact.
    ///
    /// A chunk addressed to an archived transfer is rejected as late.
    pub async fn get_or_create(&self, chunk: &IncomingChunk) -> Result<TransferHandle> {
        let key = chunk.key();
        let mut inner = self.inner.lock().await;

        if let Some(tombstone) = inner.archived.get(key) {
            return Err(Error::LateChunk {
                transfer: key.to_string(),
                status: tombstone.summary.status,
            });
        }

        if let Some(handle) = inner.active.get(key) {
            return Ok(Arc::clone(handle));
        }

        if self.max_active > 0 && inner.active.len() >= self.max_active {
            return Err(Error::TooManyTransfers(self.max_active));
        }

        let state = TransferState::new(key, &chunk.file_name, chunk.total_chunks);
        let handle = Arc::new(Mutex::new(state));
        inner.active.insert(key.to_string(), Arc::clone(&handle));

        tracing::debug!(
            transfer = %key,
            file = %chunk.file_name,
            total_chunks = chunk.total_chunks,
            "Registered transfer"
        );

        Ok(handle)
    }

    /// Look up an active transfer.
    pub async fn get(&self, key: &str) -> Option<TransferHandle> {
        self.inner.lock().await.active.get(key).cloned()
    }

    /// Move a terminal transfer to the archive.
    ///
    /// Called while the caller holds the transfer's own lock.
    pub async fn archive(&self, state: &TransferState) {
        let summary = state.summary();
        let mut inner = self.inner.lock().await;
        inner.active.remove(state.key());
        inner.archived.insert(
            state.key().to_string(),
            Tombstone {
                summary,
                archived_at: Instant::now(),
            },
        );
    }

    /// Summary of an archived transfer.
    pub async fn archived_summary(&self, key: &str) -> Option<TransferSummary> {
        self.inner
            .lock()
            .await
            .archived
            .get(key)
            .map(|t| t.summary.clone())
    }

    /// Summary of a transfer, active or archived.
    pub async fn summary(&self, key: &str) -> Option<TransferSummary> {
        let (handle, archived) = {
            let inner = self.inner.lock().await;
            (
                inner.active.get(key).cloned(),
                inner.archived.get(key).map(|t| t.summary.clone()),
            )
        };

        match handle {
            Some(handle) => Some(handle.lock().await.summary()),
            None => archived,
        }
    }

    /// Number of transfers still collecting or assembling.
    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    /// Number of tombstones held.
    pub async fn archived_count(&self) -> usize {
        self.inner.lock().await.archived.len()
    }

    /// Fail idle transfers and drop expired tombstones.
    ///
    /// Transfers whose lock is currently held are busy and skipped.
    pub async fn sweep(&self, idle_timeout: Duration, retain_finished: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let before = inner.archived.len();
        inner
            .archived
            .retain(|_, t| now.duration_since(t.archived_at) < retain_finished);
        report.pruned = before - inner.archived.len();

        let mut expired = Vec::new();
        for (key, handle) in &inner.active {
            let Ok(mut state) = handle.try_lock() else {
                continue;
            };
            if state.status().is_terminal() {
                continue;
            }
            if now.duration_since(state.last_activity()) < idle_timeout {
                continue;
            }

            let status = state.status();
            state.fail(format!(
                "expired after {}s idle while {status}",
                idle_timeout.as_secs()
            ));
            tracing::info!(
                transfer = %key,
                received = state.received_count(),
                total = state.total_chunks(),
                "Transfer expired"
            );
            expired.push((key.clone(), state.summary()));
        }

        for (key, summary) in expired {
            inner.active.remove(&key);
            inner.archived.insert(
                key.clone(),
                Tombstone {
                    summary,
                    archived_at: now,
                },
            );
            report.expired.push(key);
        }

        report
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(0)
    }
}

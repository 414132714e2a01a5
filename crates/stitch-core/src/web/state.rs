//! Shared state for the HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::access_log::AccessLog;
use crate::sink::Sink;
use crate::transfer::Collector;

/// State cloned into every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Chunk collector
    pub collector: Arc<Collector>,
    /// Request log
    pub access_log: AccessLog,
    /// When the server started
    pub started_at: Instant,
}

impl AppState {
    /// Create state around a collector.
    #[must_use]
    pub fn new(collector: Arc<Collector>, access_log: AccessLog) -> Self {
        Self {
            collector,
            access_log,
            started_at: Instant::now(),
        }
    }

    /// The artifact sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn Sink> {
        self.collector.sink()
    }
}

//! Best-effort HTTP access log.
//!
//! Each ingestion request produces one line in common log format. Lines go
//! through a bounded queue to a writer task; when the queue is full or the
//! writer is gone the line is dropped and counted, so request handling never
//! waits on the log file.
//!
//! ```text
//! 203.0.113.9 - - [16/Oct/2026:14:03:11 +0000] "POST /upload report.pdf chunk 3/12" 200 5242880
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// File name of the access log inside its directory.
pub const ACCESS_LOG_FILE: &str = "access.log";

/// One logged request.
#[derive(Debug, Clone)]
pub struct AccessEntry {
    /// Client address, if known
    pub client: Option<String>,
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// File name from the request metadata
    pub file_name: Option<String>,
    /// Chunk index and total, when both were parsed
    pub chunk: Option<(u64, u64)>,
    /// Response status code
    pub status: u16,
    /// Request body size
    pub bytes: usize,
    /// When the request was handled
    pub at: DateTime<Local>,
}

impl AccessEntry {
    /// Start an entry for a request handled now.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client: None,
            method: method.into(),
            path: path.into(),
            file_name: None,
            chunk: None,
            status: 200,
            bytes: 0,
            at: Local::now(),
        }
    }

    /// Render the entry as one log line, without the trailing newline.
    #[must_use]
    pub fn format(&self) -> String {
        let mut request = format!("{} {}", self.method, self.path);
        if let Some(name) = &self.file_name {
            request.push(' ');
            request.push_str(name);
        }
        if let Some((index, total)) = self.chunk {
            request.push_str(&format!(" chunk {index}/{total}"));
        }

        format!(
            "{} - - [{}] \"{}\" {} {}",
            self.client.as_deref().unwrap_or("-"),
            self.at.format("%d/%b/%Y:%H:%M:%S %z"),
            request,
            self.status,
            self.bytes
        )
    }
}

/// First address in an `X-Forwarded-For` value.
#[must_use]
pub fn forwarded_client(header: &str) -> Option<String> {
    header
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Cloneable handle used by request handlers to submit lines.
#[derive(Debug, Clone)]
pub struct AccessLog {
    tx: Option<mpsc::Sender<String>>,
    dropped: Arc<AtomicU64>,
}

impl AccessLog {
    /// A log that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open `<dir>/access.log` for appending and start the writer task.
    ///
    /// The task ends once every handle has been dropped and the queue drained.
    pub async fn spawn(dir: &Path, capacity: usize) -> Result<(Self, AccessLogTask)> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(ACCESS_LOG_FILE);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(write_lines(file, rx, path.clone()));

        tracing::debug!(path = %path.display(), capacity, "Access log started");

        Ok((
            Self {
                tx: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            AccessLogTask { path, task },
        ))
    }

    /// Queue an entry without waiting.
    pub fn record(&self, entry: &AccessEntry) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.try_send(entry.format()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Lines dropped because the queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns `true` if lines are being written anywhere.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

/// The running writer task.
#[derive(Debug)]
pub struct AccessLogTask {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl AccessLogTask {
    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for queued lines to be written.
    ///
    /// Only returns once every [`AccessLog`] handle has been dropped.
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("Access log writer ended abnormally: {}", e);
        }
    }
}

async fn write_lines(mut file: tokio::fs::File, mut rx: mpsc::Receiver<String>, path: PathBuf) {
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(e) = file.write_all(line.as_bytes()).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write access log");
        }
    }
    if let Err(e) = file.flush().await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to flush access log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry() -> AccessEntry {
        AccessEntry {
            client: Some("203.0.113.9".into()),
            method: "POST".into(),
            path: "/upload".into(),
            file_name: Some("report.pdf".into()),
            chunk: Some((3, 12)),
            status: 200,
            bytes: 42,
            at: Local.with_ymd_and_hms(2026, 10, 16, 14, 3, 11).unwrap(),
        }
    }

    #[test]
    fn test_format() {
        let line = entry().format();
        assert!(line.starts_with("203.0.113.9 - - [16/Oct/2026:14:03:11 "));
        assert!(line.ends_with("] \"POST /upload report.pdf chunk 3/12\" 200 42"));
    }

    #[test]
    fn test_format_without_metadata() {
        let mut e = entry();
        e.client = None;
        e.file_name = None;
        e.chunk = None;
        e.status = 400;
        assert!(e.format().starts_with("- - - ["));
        assert!(e.format().ends_with("\"POST /upload\" 400 42"));
    }

    #[test]
    fn test_forwarded_client() {
        assert_eq!(
            forwarded_client("198.51.100.1, 10.0.0.1"),
            Some("198.51.100.1".into())
        );
        assert_eq!(forwarded_client("  "), None);
    }

    #[test]
    fn test_disabled_records_nothing() {
        let log = AccessLog::disabled();
        log.record(&entry());
        assert!(!log.is_enabled());
        assert_eq!(log.dropped(), 0);
    }

    #[tokio::test]
    async fn test_lines_written_in_order() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let (log, task) = AccessLog::spawn(temp_dir.path(), 16).await.expect("spawn");

        for i in 0..3 {
            let mut e = entry();
            e.chunk = Some((i, 3));
            log.record(&e);
        }
        drop(log);
        task.finish().await;

        let content = std::fs::read_to_string(temp_dir.path().join(ACCESS_LOG_FILE)).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("chunk 0/3"));
        assert!(lines[2].contains("chunk 2/3"));
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let (log, task) = AccessLog::spawn(temp_dir.path(), 1).await.expect("spawn");

        // current-thread runtime: the writer cannot run until we yield
        for _ in 0..5 {
            log.record(&entry());
        }
        assert_eq!(log.dropped(), 4);

        drop(log);
        task.finish().await;
    }
}

//! Chunk uploader.
//!
//! [`ChunkSender`] reads files chunk by chunk with [`FileChunker`] and posts
//! every chunk to a Stitch server, several at a time. A chunk is read only
//! when a request slot is free, so memory stays near
//! `parallel_chunks * chunk_size` whatever the file size. Several files can
//! be sent at once with [`ChunkSender::send_files`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{stream, Stream, TryStreamExt};
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::file::{file_name_of, ChunkReader, FileChunk, FileChunker};
use crate::protocol;

/// How the server answered one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkAck {
    /// Stored, transfer still incomplete
    Stored,
    /// Stored and the file was assembled
    Completed,
    /// Stored, but writing the assembled file failed on the server
    AssemblyPending,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: String,
}

/// Outcome of sending one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Artifact name on the server
    pub file_name: String,
    /// Identity the chunks were grouped under
    pub transfer_key: String,
    /// File size in bytes
    pub size: u64,
    /// Number of chunks sent
    pub chunks: u64,
    /// Assembly retries needed before the file was written
    pub assembly_retries: u32,
}

/// Uploads files to a Stitch server in chunks.
#[derive(Debug, Clone)]
pub struct ChunkSender {
    http: reqwest::Client,
    base_url: String,
    chunker: FileChunker,
    parallel: usize,
    assembly_retries: u32,
    use_transfer_id: bool,
}

impl ChunkSender {
    /// Create a sender from client settings.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::RequestFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            chunker: FileChunker::new(config.chunk_size),
            parallel: config.parallel_chunks.max(1),
            assembly_retries: config.assembly_retries,
            use_transfer_id: config.use_transfer_id,
        })
    }

    /// Server base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Split and upload one file.
    pub async fn send_file(&self, path: &Path) -> Result<SendReport> {
        let file_name = file_name_of(path)?;
        let reader = self.chunker.open(path).await?;
        let (size, total) = (reader.size(), reader.total());
        self.send_chunks(file_name, size, total, read_lazily(reader))
            .await
    }

    /// Split and upload an in-memory buffer under `file_name`.
    pub async fn send_bytes(&self, file_name: &str, data: &[u8]) -> Result<SendReport> {
        crate::file::validate_artifact_name(file_name)?;
        let chunks = self.chunker.split_bytes(data);
        let total = self.chunker.chunk_count(data.len() as u64);
        self.send_chunks(
            file_name.to_string(),
            data.len() as u64,
            total,
            stream::iter(chunks.into_iter().map(Ok)),
        )
        .await
    }

    /// Upload several files concurrently.
    ///
    /// Every file gets its own result; one failure does not stop the others.
    pub async fn send_files(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<SendReport>)> {
        let uploads = paths.iter().map(|path| async move {
            let result = self.send_file(path).await;
            if let Err(e) = &result {
                tracing::warn!(path = %path.display(), error = %e, "Upload failed");
            }
            (path.clone(), result)
        });
        futures::future::join_all(uploads).await
    }

    async fn send_chunks<S>(
        &self,
        file_name: String,
        size: u64,
        total: u64,
        chunks: S,
    ) -> Result<SendReport>
    where
        S: Stream<Item = Result<FileChunk>>,
    {
        let transfer_key = if self.use_transfer_id {
            uuid::Uuid::new_v4().to_string()
        } else {
            file_name.clone()
        };
        let transfer_id = self.use_transfer_id.then_some(transfer_key.as_str());

        tracing::debug!(
            file = %file_name,
            transfer = %transfer_key,
            size,
            chunks = total,
            "Sending file"
        );

        let acks: Vec<ChunkAck> = chunks
            .map_ok(|chunk| self.post_chunk(&file_name, transfer_id, chunk))
            .try_buffer_unordered(self.parallel)
            .try_collect()
            .await?;

        let mut assembly_retries = 0;
        if !acks.contains(&ChunkAck::Completed) {
            if !acks.contains(&ChunkAck::AssemblyPending) {
                return Err(Error::Internal(format!(
                    "server never reported '{file_name}' as complete"
                )));
            }
            assembly_retries = self.finish_assembly(&transfer_key).await?;
        }

        tracing::info!(file = %file_name, size, chunks = total, "File sent");

        Ok(SendReport {
            file_name,
            transfer_key,
            size,
            chunks: total,
            assembly_retries,
        })
    }

    async fn post_chunk(
        &self,
        file_name: &str,
        transfer_id: Option<&str>,
        chunk: FileChunk,
    ) -> Result<ChunkAck> {
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, protocol::UPLOAD_PATH))
            .header(protocol::FILENAME, file_name)
            .header(protocol::CHUNK_NUMBER, chunk.index.to_string())
            .header(protocol::TOTAL_CHUNKS, chunk.total.to_string());
        if let Some(id) = transfer_id {
            request = request.header(protocol::TRANSFER_ID, id);
        }

        let response = request
            .body(chunk.data)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.to_string()))?;

        if response.status().is_success() {
            let complete = response
                .headers()
                .get(protocol::TRANSFER_COMPLETE)
                .is_some_and(|v| v.as_bytes() == b"true");
            return Ok(if complete {
                ChunkAck::Completed
            } else {
                ChunkAck::Stored
            });
        }

        let (status, body) = rejection(response).await;
        if body.code.as_deref() == Some("E006") {
            tracing::warn!(file = %file_name, index = chunk.index, "Server could not store assembled file");
            return Ok(ChunkAck::AssemblyPending);
        }
        Err(Error::Rejected {
            status,
            message: body.message,
        })
    }

    async fn finish_assembly(&self, transfer_key: &str) -> Result<u32> {
        let url = format!("{}{}", self.base_url, protocol::assemble_path(transfer_key));
        let mut last_error = None;

        for attempt in 1..=self.assembly_retries {
            tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;

            let response = self
                .http
                .post(&url)
                .send()
                .await
                .map_err(|e| Error::RequestFailed(e.to_string()))?;

            if response.status().is_success() {
                return Ok(attempt);
            }

            let (status, body) = rejection(response).await;
            let error = Error::Rejected {
                status,
                message: body.message,
            };
            if body.code.as_deref() != Some("E006") {
                return Err(error);
            }
            tracing::debug!(transfer = %transfer_key, attempt, "Assembly retry failed");
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| Error::Rejected {
            status: 503,
            message: format!("assembly of transfer '{transfer_key}' still pending"),
        }))
    }
}

/// Chunks of `reader` as a stream that reads one chunk per poll.
fn read_lazily(reader: ChunkReader) -> impl Stream<Item = Result<FileChunk>> {
    stream::try_unfold(reader, |mut reader| async move {
        let next = reader.next_chunk().await?;
        Ok::<_, Error>(next.map(|chunk| (chunk, reader)))
    })
}

async fn rejection(response: reqwest::Response) -> (u16, ErrorBody) {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(ErrorBody {
        code: None,
        message: if text.is_empty() {
            format!("HTTP {status}")
        } else {
            text
        },
    });
    (status, body)
}

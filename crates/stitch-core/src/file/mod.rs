//! File splitting and artifact name handling.
//!
//! The sender side splits a file into fixed-size chunks with
//! [`FileChunker`]. Both sides use [`validate_artifact_name`] to make sure a
//! name can only ever address a single entry inside the output directory.

use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

/// Longest accepted artifact name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Check that `name` is a plain file name.
///
/// Rejects empty names, `.` and `..`, path separators, drive prefixes and
/// control characters.
pub fn validate_artifact_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("file name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "file name longer than {MAX_NAME_LEN} bytes"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(Error::Validation(format!(
            "path separators not allowed in file name: {name}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::Validation(
            "control characters not allowed in file name".into(),
        ));
    }
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return Err(Error::Validation(format!(
            "drive prefix not allowed in file name: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::Validation(format!("invalid file name: {name}"))),
    }
}

/// The final component of `path` as a UTF-8 string.
pub fn file_name_of(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("no usable file name in {}", path.display())))?;
    validate_artifact_name(name)?;
    Ok(name.to_string())
}

/// One outgoing chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    /// Position in the file, starting at 0
    pub index: u64,
    /// Number of chunks the file was split into
    pub total: u64,
    /// Chunk data
    pub data: Vec<u8>,
}

/// Splits files into fixed-size chunks.
#[derive(Debug, Clone, Copy)]
pub struct FileChunker {
    /// Chunk size in bytes
    pub chunk_size: usize,
}

impl FileChunker {
    /// Create a new chunker with the given chunk size.
    ///
    /// A size of zero is treated as one byte.
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 { 1 } else { chunk_size };
        Self { chunk_size }
    }

    /// Number of chunks a file of `size` bytes is split into.
    ///
    /// An empty file still takes one (empty) chunk.
    #[must_use]
    pub const fn chunk_count(&self, size: u64) -> u64 {
        if size == 0 {
            1
        } else {
            size.div_ceil(self.chunk_size as u64)
        }
    }

    /// Split an in-memory buffer.
    #[must_use]
    pub fn split_bytes(&self, data: &[u8]) -> Vec<FileChunk> {
        let total = self.chunk_count(data.len() as u64);
        if data.is_empty() {
            return vec![FileChunk {
                index: 0,
                total,
                data: Vec::new(),
            }];
        }

        data.chunks(self.chunk_size)
            .zip(0u64..)
            .map(|(slice, index)| FileChunk {
                index,
                total,
                data: slice.to_vec(),
            })
            .collect()
    }

    /// Open a file for chunked reading.
    ///
    /// Chunks are read one at a time by [`ChunkReader::next_chunk`], so only
    /// the chunks in flight are held in memory.
    pub async fn open(&self, path: &Path) -> Result<ChunkReader> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let total = self.chunk_count(size);

        tracing::debug!(
            path = %path.display(),
            size,
            chunks = total,
            chunk_size = self.chunk_size,
            "Opened file for sending"
        );

        Ok(ChunkReader {
            file,
            path: path.to_path_buf(),
            chunk_size: self.chunk_size,
            size,
            total,
            next_index: 0,
        })
    }
}

/// Reads a file one chunk at a time.
///
/// Every chunk except the last is exactly `chunk_size` bytes.
#[derive(Debug)]
pub struct ChunkReader {
    file: tokio::fs::File,
    path: PathBuf,
    chunk_size: usize,
    size: u64,
    total: u64,
    next_index: u64,
}

impl ChunkReader {
    /// File size when it was opened.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of chunks the file is split into.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Read the next chunk, or `None` once all chunks were read.
    pub async fn next_chunk(&mut self) -> Result<Option<FileChunk>> {
        if self.next_index >= self.total {
            return Ok(None);
        }

        let mut data = Vec::with_capacity(self.chunk_size);
        (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(&mut data)
            .await?;

        if data.is_empty() && self.size != 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} shrank while being read", self.path.display()),
            )));
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(FileChunk {
            index,
            total: self.total,
            data,
        }))
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

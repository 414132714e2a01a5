//! Chunk upload wire protocol.
//!
//! Every chunk is one HTTP request whose body is the raw chunk bytes. Its
//! position is carried in headers:
//!
//! | Header | Required | Meaning |
//! |--------|----------|---------|
//! | `Filename` | yes | artifact name, a plain file name |
//! | `Chunk-Number` | yes | zero-based chunk index |
//! | `Total-Chunks` | yes | chunk count of the whole file, > 0 |
//! | `Transfer-Id` | no | groups chunks; defaults to `Filename` |
//!
//! A successful upload answers `200` with an empty body and the
//! `Chunks-Received`, `Total-Chunks` and `Transfer-Complete` headers.

use crate::error::{Error, Result};
use crate::transfer::IncomingChunk;

/// Artifact name header
pub const FILENAME: &str = "Filename";
/// Chunk index header
pub const CHUNK_NUMBER: &str = "Chunk-Number";
/// Chunk count header
pub const TOTAL_CHUNKS: &str = "Total-Chunks";
/// Optional transfer identity header
pub const TRANSFER_ID: &str = "Transfer-Id";
/// Response header: distinct chunks stored so far
pub const CHUNKS_RECEIVED: &str = "Chunks-Received";
/// Response header: `true` once the artifact was written
pub const TRANSFER_COMPLETE: &str = "Transfer-Complete";

/// Chunk upload endpoint
pub const UPLOAD_PATH: &str = "/upload";
/// Append-to-artifact endpoint
pub const UPDATE_PATH: &str = "/update";
/// Delete-artifact endpoint
pub const DELETE_PATH: &str = "/delete";
/// Server status endpoint
pub const STATUS_PATH: &str = "/status";

/// Path that retries a transfer's assembly.
#[must_use]
pub fn assemble_path(key: &str) -> String {
    format!("/transfers/{key}/assemble")
}

/// Build an [`IncomingChunk`] from request headers.
///
/// `header` looks a header up by name and returns its raw value. A header
/// that is present but not UTF-8 text is rejected rather than treated as
/// absent. Only presence and syntax are checked here; range rules are
/// applied by [`IncomingChunk::validate`].
pub fn parse_chunk_headers<'h, F>(header: F, payload: Vec<u8>) -> Result<IncomingChunk>
where
    F: Fn(&str) -> Option<&'h [u8]>,
{
    let file_name = required(&header, FILENAME)?;
    let index = parse_number(&header, CHUNK_NUMBER)?;
    let total_chunks = parse_number(&header, TOTAL_CHUNKS)?;

    let mut chunk = IncomingChunk::new(file_name, index, total_chunks, payload);
    if let Some(id) = text(&header, TRANSFER_ID)? {
        chunk = chunk.with_transfer_id(id.trim());
    }
    Ok(chunk)
}

fn text<'h, F>(header: &F, name: &str) -> Result<Option<&'h str>>
where
    F: Fn(&str) -> Option<&'h [u8]>,
{
    header(name)
        .map(|raw| {
            std::str::from_utf8(raw)
                .map_err(|_| Error::Validation(format!("{name} header is not valid UTF-8")))
        })
        .transpose()
}

fn required<'h, F>(header: &F, name: &str) -> Result<&'h str>
where
    F: Fn(&str) -> Option<&'h [u8]>,
{
    text(header, name)?
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("missing {name} header")))
}

fn parse_number<'h, F>(header: &F, name: &str) -> Result<u64>
where
    F: Fn(&str) -> Option<&'h [u8]>,
{
    let raw = required(header, name)?;
    raw.parse()
        .map_err(|_| Error::Validation(format!("{name} header is not a non-negative integer: {raw}")))
}

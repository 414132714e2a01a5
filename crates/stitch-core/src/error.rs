//! Error types for Stitch.
//!
//! This module provides a unified error type for chunk ingestion, assembly
//! and artifact storage, with specific variants for each failure mode.

use std::io;

use thiserror::Error;

use crate::transfer::TransferStatus;

/// A specialized `Result` type for Stitch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Stitch.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed chunk metadata (E001)
    #[error("invalid request: {0}")]
    Validation(String),

    /// Chunk metadata disagrees with the established transfer (E002)
    #[error("protocol mismatch for transfer '{transfer}': {detail}")]
    ProtocolMismatch {
        /// Transfer identity
        transfer: String,
        /// What disagreed
        detail: String,
    },

    /// Re-delivered chunk carries different bytes than the stored one (E003)
    #[error("chunk {index} of transfer '{transfer}' was already received with different content")]
    DuplicateMismatch {
        /// Transfer identity
        transfer: String,
        /// Chunk index
        index: u64,
    },

    /// Chunk arrived after the transfer stopped collecting (E004)
    #[error("late chunk for transfer '{transfer}' ({status})")]
    LateChunk {
        /// Transfer identity
        transfer: String,
        /// Status the transfer was in when the chunk arrived
        status: TransferStatus,
    },

    /// A chunk index was absent at assembly time (E005)
    #[error("chunk {index} of transfer '{transfer}' missing at assembly")]
    MissingChunk {
        /// Transfer identity
        transfer: String,
        /// The first missing index
        index: u64,
    },

    /// The sink could not persist an assembled artifact (E006)
    #[error("failed to write artifact '{name}': {reason}")]
    SinkWriteFailed {
        /// Artifact name
        name: String,
        /// Underlying failure
        reason: String,
    },

    /// The registry is at its active-transfer limit (E007)
    #[error("too many active transfers (limit {0})")]
    TooManyTransfers(usize),

    /// No transfer is known under this identity (E008)
    #[error("transfer not found: {0}")]
    TransferNotFound(String),

    /// No assembled artifact exists under this name (E009)
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// The requested operation does not apply to the transfer's status (E010)
    #[error("transfer '{transfer}' is {status}")]
    InvalidState {
        /// Transfer identity
        transfer: String,
        /// Current status
        status: TransferStatus,
    },

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// HTTP request could not be performed
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Server answered with a non-success status
    #[error("server rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error message returned by the server
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::Validation(_) => Some("E001"),
            Self::ProtocolMismatch { .. } => Some("E002"),
            Self::DuplicateMismatch { .. } => Some("E003"),
            Self::LateChunk { .. } => Some("E004"),
            Self::MissingChunk { .. } => Some("E005"),
            Self::SinkWriteFailed { .. } => Some("E006"),
            Self::TooManyTransfers(_) => Some("E007"),
            Self::TransferNotFound(_) => Some("E008"),
            Self::ArtifactNotFound(_) => Some("E009"),
            Self::InvalidState { .. } => Some("E010"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SinkWriteFailed { .. } | Self::TooManyTransfers(_) | Self::RequestFailed(_)
        )
    }

    /// Returns whether the error ended the transfer it was raised for.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolMismatch { .. } | Self::MissingChunk { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Validation("x".into()).code(), Some("E001"));
        assert_eq!(
            Error::LateChunk {
                transfer: "a".into(),
                status: TransferStatus::Complete,
            }
            .code(),
            Some("E004")
        );
        assert_eq!(Error::Internal("x".into()).code(), None);
    }

    #[test]
    fn test_recoverable() {
        let err = Error::SinkWriteFailed {
            name: "a.bin".into(),
            reason: "disk full".into(),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_terminal());

        let err = Error::ProtocolMismatch {
            transfer: "a.bin".into(),
            detail: "total chunks 3 != 4".into(),
        };
        assert!(!err.is_recoverable());
        assert!(err.is_terminal());
    }

    #[test]
    fn test_display() {
        let err = Error::MissingChunk {
            transfer: "report.pdf".into(),
            index: 7,
        };
        assert_eq!(
            err.to_string(),
            "chunk 7 of transfer 'report.pdf' missing at assembly"
        );
    }
}

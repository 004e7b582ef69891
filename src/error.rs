//! Error handling for fastget.
//!
//! This module provides the error taxonomy of the segmented download engine.
//! Transient network conditions are modelled separately as [`TransferError`]:
//! they are retried locally and only surface wrapped in a terminal
//! [`Error::ChunkTransferFailed`] or [`Error::WholeStreamTransferFailed`] once
//! the retry budget is spent.

use crate::segment::ByteRange;

use reqwest::StatusCode;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can happen while downloading a target.
#[derive(Error, Debug)]
pub enum Error {
    /// The size and range capability of the resource could not be discovered.
    #[error("Probe failed for {url}: {reason}")]
    ProbeFailed { url: String, reason: String },

    /// A byte range exhausted its retries.
    ///
    /// Bytes of other ranges stay on disk so that a later run can resume.
    #[error("Chunk {range} failed after {attempts} attempts")]
    ChunkTransferFailed {
        range: ByteRange,
        attempts: u32,
        #[source]
        cause: TransferError,
    },

    /// The single-stream transfer exhausted its retries.
    #[error("Whole-stream transfer failed after {attempts} attempts")]
    WholeStreamTransferFailed {
        attempts: u32,
        #[source]
        cause: TransferError,
    },

    /// The bytes arrived but their digest is not the expected one.
    #[error("{algorithm} mismatch: expected {expected}, got {actual}")]
    VerificationMismatch {
        algorithm: String,
        expected: String,
        actual: String,
    },

    /// A resume record exists but cannot be applied to the current plan.
    #[error("Invalid resume state: {0}")]
    ResumeStateInvalid(String),

    /// The destination or the resume record cannot be written.
    #[error("Storage failure on {path:?}")]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Error from the underlying URL parser or the expected URL format.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A configuration value cannot be used (zero chunk size, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The session was cancelled by the caller.
    #[error("Download cancelled")]
    Cancelled,

    /// The HTTP client could not be built.
    #[error("HTTP client error")]
    HttpClient {
        #[from]
        source: reqwest::Error,
    },

    /// Error from an underlying system.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an I/O error raised while touching `path`.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::StorageFailed {
            path: path.into(),
            source,
        }
    }

    /// Get the error discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProbeFailed { .. } => ErrorKind::ProbeFailed,
            Error::ChunkTransferFailed { .. } => ErrorKind::ChunkTransferFailed,
            Error::WholeStreamTransferFailed { .. } => ErrorKind::WholeStreamTransferFailed,
            Error::VerificationMismatch { .. } => ErrorKind::VerificationMismatch,
            Error::ResumeStateInvalid(_) => ErrorKind::ResumeStateInvalid,
            Error::StorageFailed { .. } => ErrorKind::StorageFailed,
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::HttpClient { .. } => ErrorKind::HttpClient,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Copyable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProbeFailed,
    ChunkTransferFailed,
    WholeStreamTransferFailed,
    VerificationMismatch,
    ResumeStateInvalid,
    StorageFailed,
    InvalidUrl,
    InvalidConfig,
    Cancelled,
    HttpClient,
    Internal,
}

/// Transient cause of a failed transfer attempt.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The request could not be sent or no response was received.
    #[error("request failed")]
    Request {
        #[from]
        source: reqwest_middleware::Error,
    },

    /// The response body stopped with an error.
    #[error("body read failed")]
    Body {
        #[from]
        source: reqwest::Error,
    },

    /// The server answered with a status the transfer cannot use.
    #[error("unexpected status {0}")]
    Status(StatusCode),

    /// The server answered a different span than the one requested.
    #[error("unexpected Content-Range {0:?}")]
    ContentRange(String),

    /// The body ended before the expected number of bytes arrived.
    #[error("short body: received {received} of {expected} bytes")]
    ShortBody { expected: u64, received: u64 },

    /// No progress was made within the attempt timeout.
    #[error("no progress within {0:?}")]
    Timeout(Duration),
}

/// Result type alias for fastget operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = Error::ChunkTransferFailed {
            range: ByteRange::new(40, 79),
            attempts: 6,
            cause: TransferError::Status(StatusCode::INTERNAL_SERVER_ERROR),
        };
        assert_eq!(err.kind(), ErrorKind::ChunkTransferFailed);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_display_names_the_chunk() {
        let err = Error::ChunkTransferFailed {
            range: ByteRange::new(40, 79),
            attempts: 6,
            cause: TransferError::Timeout(Duration::from_secs(1)),
        };
        assert_eq!(err.to_string(), "Chunk [40, 80) failed after 6 attempts");
    }

    #[test]
    fn test_storage_helper() {
        let err = Error::storage("/tmp/x", io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::StorageFailed);
        assert!(std::error::Error::source(&err).is_some());
    }
}

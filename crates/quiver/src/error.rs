//! Error types for Quiver.
//!
//! This module provides the [`enum@Error`] type covering every failure a
//! caller can observe, and the transport-agnostic [`ErrorKind`] taxonomy
//! that adapters (HTTP or otherwise) map onto status codes.

use quiver_core::{ChunkId, DocumentId, LibraryId};
use quiver_index::IndexError;
use thiserror::Error;

/// Errors that can occur when using Quiver.
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced library does not exist.
    #[error("library not found: {0}")]
    LibraryNotFound(LibraryId),

    /// The referenced document does not exist.
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// The referenced chunk does not exist.
    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkId),

    /// Invalid input: dimension mismatch, zero vector, bad index
    /// configuration, empty name or text, invalid `k`.
    #[error("validation error: {0}")]
    Validation(String),

    /// An optimistic version check failed; the caller should re-read and
    /// retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A lock could not be acquired without blocking.
    #[error("busy: {0}")]
    Busy(String),

    /// An internal invariant was violated. Never retried.
    #[error("internal error: {0}")]
    Internal(String),
}

/// The transport-agnostic classification of an [`enum@Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity does not exist.
    NotFound,
    /// The request was malformed or violated a constraint.
    Validation,
    /// An optimistic concurrency check failed.
    Conflict,
    /// A lock acquisition timed out or would block.
    Busy,
    /// An internal invariant violation.
    Internal,
}

impl ErrorKind {
    /// The canonical HTTP status for this kind.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Validation => 400,
            Self::Conflict | Self::Busy => 409,
            Self::Internal => 500,
        }
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LibraryNotFound(_) | Self::DocumentNotFound(_) | Self::ChunkNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a busy error.
    #[must_use]
    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<IndexError> for Error {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { .. } | IndexError::ZeroVector => {
                Self::Validation(err.to_string())
            }
            // Duplicate or missing index entries mean the service let the
            // index diverge from the chunk store.
            IndexError::DuplicateChunk(_) | IndexError::ChunkNotFound(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<quiver_core::ConfigError> for Error {
    fn from(err: quiver_core::ConfigError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// A specialized `Result` type for Quiver operations.
pub type Result<T> = std::result::Result<T, Error>;

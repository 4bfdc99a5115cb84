//! Error types for index operations.

use quiver_core::ChunkId;
use thiserror::Error;

/// Errors that can occur in vector index operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// A vector's dimension does not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The index dimension.
        expected: usize,
        /// The dimension of the rejected vector.
        actual: usize,
    },

    /// A zero vector cannot be normalized and is rejected.
    #[error("zero vector cannot be indexed")]
    ZeroVector,

    /// An `add` collided with an id already present in the index.
    #[error("chunk already present in index: {0}")]
    DuplicateChunk(ChunkId),

    /// An `update` referenced an id absent from the index.
    #[error("chunk not present in index: {0}")]
    ChunkNotFound(ChunkId),
}

//! The common contract implemented by every index strategy.

use quiver_core::ChunkId;

use crate::error::IndexError;

/// A candidate filter applied between candidate generation and final
/// top-k selection.
pub type ChunkFilter<'a> = dyn Fn(ChunkId) -> bool + 'a;

/// A single search result: a chunk id and its cosine similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredHit {
    /// The matching chunk.
    pub chunk_id: ChunkId,
    /// Cosine similarity in [-1, 1]; higher is closer.
    pub score: f32,
}

impl ScoredHit {
    /// Create a new scored hit.
    #[must_use]
    pub const fn new(chunk_id: ChunkId, score: f32) -> Self {
        Self { chunk_id, score }
    }
}

/// Trait for per-library vector indexes.
///
/// Implementations store L2-normalized vectors keyed by [`ChunkId`] and
/// answer k-nearest-neighbor queries by cosine similarity. Results are
/// ordered by descending score with ties broken by ascending chunk id.
///
/// The trait is object safe; the registry holds indexes as
/// `Box<dyn VectorIndex>`.
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Insert a vector for a chunk.
    ///
    /// # Errors
    ///
    /// Fails with [`IndexError::DuplicateChunk`] if the id is already
    /// present, [`IndexError::DimensionMismatch`] on a length mismatch, or
    /// [`IndexError::ZeroVector`] for an un-normalizable vector.
    fn add(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError>;

    /// Replace the stored vector for a chunk.
    ///
    /// # Errors
    ///
    /// Fails with [`IndexError::ChunkNotFound`] if the id is absent, or with
    /// the same validation errors as [`VectorIndex::add`].
    fn update(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError>;

    /// Remove a chunk from the index.
    ///
    /// Idempotent: returns `true` if the chunk was present, `false` otherwise.
    fn remove(&mut self, chunk_id: ChunkId) -> bool;

    /// Search for the `k` nearest chunks to `query` by cosine similarity.
    ///
    /// The filter, when given, is applied to candidates before the final
    /// top-k selection, so every admissible candidate competes for a slot.
    /// An empty index yields an empty result.
    ///
    /// # Errors
    ///
    /// Fails when the query dimension does not match the index dimension or
    /// the query is a zero vector.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&ChunkFilter<'_>>,
    ) -> Result<Vec<ScoredHit>, IndexError>;

    /// Discard all state and reconstruct the index from `items`.
    ///
    /// # Errors
    ///
    /// Fails if any item fails vector validation or repeats a chunk id; the
    /// index is left empty in that case.
    fn rebuild(&mut self, items: Vec<(ChunkId, Vec<f32>)>) -> Result<(), IndexError>;

    /// The number of indexed chunks.
    fn len(&self) -> usize;

    /// Check whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The embedding dimension this index accepts.
    fn dim(&self) -> usize;
}

//! k-NN search over a library's index.

use tracing::debug;

use quiver_core::{Chunk, ChunkId, LibraryId};

use crate::error::{Error, Result};
use crate::filter::SearchFilter;

use super::{read_index, SharedState};

/// A search result hydrated through the chunk repository.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matching chunk's id.
    pub chunk_id: ChunkId,
    /// Cosine similarity in [-1, 1]; higher is closer.
    pub score: f32,
    /// A deep copy of the matching chunk.
    pub chunk: Chunk,
}

/// Top-k similarity queries.
#[derive(Clone)]
pub struct SearchService {
    state: SharedState,
}

impl SearchService {
    pub(crate) fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Search a library for the `k` chunks nearest to `query` by cosine
    /// similarity, optionally filtered.
    ///
    /// Candidate scoring runs under the library's read lock; hit hydration
    /// happens outside the critical section on deep copies.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when the library is absent; validation
    /// errors for `k == 0`, a dimension mismatch, or a zero query vector.
    pub fn search(
        &self,
        library_id: LibraryId,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        self.run(library_id, query, k, filter, false)
    }

    /// Non-blocking variant of [`SearchService::search`].
    ///
    /// # Errors
    ///
    /// `Error::Busy` when a writer holds the library lock, instead of
    /// waiting for it; otherwise as [`SearchService::search`].
    pub fn try_search(
        &self,
        library_id: LibraryId,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        self.run(library_id, query, k, filter, true)
    }

    fn run(
        &self,
        library_id: LibraryId,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
        non_blocking: bool,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::validation("k must be at least 1"));
        }
        let library = self.state.require_library(library_id)?;
        if query.len() != library.embedding_dim {
            return Err(Error::validation(format!(
                "query dimension mismatch: expected {}, got {}",
                library.embedding_dim,
                query.len()
            )));
        }

        let lock = self.state.locks.handle(library_id)?;
        let guard = if non_blocking { lock.try_read()? } else { lock.read()? };
        // Re-check under the lock: the library may have been deleted while
        // we were waiting.
        self.state.require_library(library_id)?;
        let index_handle = self.state.indexes.get(library_id)?;

        let scored = {
            let index = read_index(&index_handle)?;
            match filter.filter(|f| !f.is_empty()) {
                Some(f) => {
                    let admissible = |chunk_id: ChunkId| {
                        self.state.chunks.matches(chunk_id, f).unwrap_or(false)
                    };
                    index.search(query, k, Some(&admissible))?
                }
                None => index.search(query, k, None)?,
            }
        };
        drop(guard);

        let mut hits = Vec::with_capacity(scored.len());
        for hit in scored {
            if let Some(chunk) = self.state.chunks.get(hit.chunk_id)? {
                hits.push(SearchHit { chunk_id: hit.chunk_id, score: hit.score, chunk });
            }
        }

        debug!(library = %library_id, k, hits = hits.len(), "search completed");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use quiver_core::{IndexConfig, Metadata};

    use crate::config::DatabaseConfig;
    use crate::error::ErrorKind;
    use crate::service::{ChunkDraft, ChunkService, LibraryService, Shared, SharedState};

    fn state() -> SharedState {
        Arc::new(Shared::new(DatabaseConfig::default()))
    }

    #[test]
    fn try_search_reports_busy_under_a_writer() {
        let state = state();
        let libraries = LibraryService::new(Arc::clone(&state));
        let chunks = ChunkService::new(Arc::clone(&state));
        let search = SearchService::new(Arc::clone(&state));

        let library = libraries
            .create("lib", 2, IndexConfig::Flat, Metadata::new())
            .expect("failed to create library");
        chunks
            .create(library.id, None, ChunkDraft::new(0, "a", vec![1.0, 0.0]))
            .expect("failed to create chunk");

        let lock = state.locks.handle(library.id).expect("handle");
        let guard = lock.write().expect("write");
        let err = search
            .try_search(library.id, &[1.0, 0.0], 1, None)
            .expect_err("writer holds the lock");
        assert_eq!(err.kind(), ErrorKind::Busy);
        drop(guard);

        // Uncontended, the non-blocking variant behaves like search.
        let hits = search
            .try_search(library.id, &[1.0, 0.0], 1, None)
            .expect("uncontended try_search");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn try_search_still_validates_first() {
        let state = state();
        let libraries = LibraryService::new(Arc::clone(&state));
        let search = SearchService::new(Arc::clone(&state));

        let library = libraries
            .create("lib", 2, IndexConfig::Flat, Metadata::new())
            .expect("failed to create library");

        let err = search
            .try_search(library.id, &[1.0, 0.0, 0.0], 1, None)
            .expect_err("dim mismatch");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

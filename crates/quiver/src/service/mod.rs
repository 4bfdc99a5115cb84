//! Service layer: the transactional choreography over repositories, locks,
//! and indexes.
//!
//! Every mutating use case on a library follows the same order: acquire the
//! library's write lock, validate preconditions, apply repository writes,
//! apply index updates, CAS-commit the owning entity, release. When an index
//! update fails, the repository mutation is reverted before the lock is
//! released, so readers never observe torn state.

mod chunk;
mod document;
mod library;
mod search;

pub use chunk::{ChunkPatch, ChunkService, ChunkUpsert};
pub use document::DocumentService;
pub use library::LibraryService;
pub use search::{SearchHit, SearchService};

use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use quiver_core::{Chunk, ChunkId, DocumentId, IdGenerator, Library, LibraryId, Metadata};
use quiver_index::distance::l2_norm;
use quiver_index::VectorIndex;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::lock::LockRegistry;
use crate::registry::{IndexHandle, IndexRegistry};
use crate::repo::{ChunkRepo, DocumentRepo, LibraryRepo};

/// Fields for a chunk to be created.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    /// Ordinal sort key within the chunk's document.
    pub position: usize,
    /// The chunk text; must not be empty.
    pub text: String,
    /// The embedding; must match the library's dimension and be non-zero.
    pub embedding: Vec<f32>,
    /// Free-form metadata.
    pub metadata: Metadata,
}

impl ChunkDraft {
    /// Create a draft with empty metadata.
    #[must_use]
    pub fn new(position: usize, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self { position, text: text.into(), embedding, metadata: Metadata::new() }
    }

    /// Attach metadata to the draft.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The process-wide state shared by every service handle.
pub(crate) struct Shared {
    pub(crate) config: DatabaseConfig,
    pub(crate) ids: IdGenerator,
    pub(crate) libraries: LibraryRepo,
    pub(crate) documents: DocumentRepo,
    pub(crate) chunks: ChunkRepo,
    pub(crate) locks: LockRegistry,
    pub(crate) indexes: IndexRegistry,
}

impl Shared {
    pub(crate) fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            ids: IdGenerator::new(),
            libraries: LibraryRepo::new(),
            documents: DocumentRepo::new(),
            chunks: ChunkRepo::new(),
            locks: LockRegistry::new(),
            indexes: IndexRegistry::new(),
        }
    }

    /// Look up a library or fail with `LibraryNotFound`.
    pub(crate) fn require_library(&self, library_id: LibraryId) -> Result<Library> {
        self.libraries.get(library_id)?.ok_or(Error::LibraryNotFound(library_id))
    }

    /// Look up a chunk or fail with `ChunkNotFound`.
    pub(crate) fn require_chunk(&self, chunk_id: ChunkId) -> Result<Chunk> {
        self.chunks.get(chunk_id)?.ok_or(Error::ChunkNotFound(chunk_id))
    }

    /// Validate an embedding against a library's dimension and reject zero
    /// vectors.
    pub(crate) fn validate_embedding(&self, library: &Library, embedding: &[f32]) -> Result<()> {
        if embedding.len() != library.embedding_dim {
            return Err(Error::validation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                library.embedding_dim,
                embedding.len()
            )));
        }
        if l2_norm(embedding) == 0.0 {
            return Err(Error::validation("embedding must not be a zero vector"));
        }
        Ok(())
    }

    /// Validate chunk content fields shared by create, upsert, and
    /// create-with-chunks.
    pub(crate) fn validate_draft(&self, library: &Library, draft: &ChunkDraft) -> Result<()> {
        if draft.text.is_empty() {
            return Err(Error::validation("chunk text must not be empty"));
        }
        self.validate_embedding(library, &draft.embedding)
    }

    /// Validate that `document_id`, when given, names a document inside
    /// `library_id`.
    pub(crate) fn validate_document_membership(
        &self,
        library_id: LibraryId,
        document_id: Option<DocumentId>,
    ) -> Result<()> {
        if let Some(document_id) = document_id {
            let document =
                self.documents.get(document_id)?.ok_or(Error::DocumentNotFound(document_id))?;
            if document.library_id != library_id {
                return Err(Error::validation(format!(
                    "document {document_id} does not belong to library {library_id}"
                )));
            }
        }
        Ok(())
    }

    /// Run `operation`, retrying on CAS conflicts up to the configured
    /// bound. Used by service-internal writers that read entity versions
    /// before acquiring the library lock; persistent conflict surfaces to
    /// the caller.
    pub(crate) fn retry_on_conflict<T>(
        &self,
        mut operation: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let attempts = self.config.cas_max_retries.max(1);
        let mut last = None;
        for _ in 0..attempts {
            match operation() {
                Err(Error::Conflict(msg)) => last = Some(Error::Conflict(msg)),
                other => return other,
            }
        }
        Err(last.unwrap_or_else(|| Error::internal("retry loop without attempts")))
    }
}

pub(crate) type SharedState = Arc<Shared>;

/// Take the write side of an index handle.
pub(crate) fn write_index(
    handle: &IndexHandle,
) -> Result<RwLockWriteGuard<'_, Box<dyn VectorIndex>>> {
    handle.write().map_err(|_| Error::internal("index handle poisoned"))
}

/// Take the read side of an index handle.
pub(crate) fn read_index(
    handle: &IndexHandle,
) -> Result<RwLockReadGuard<'_, Box<dyn VectorIndex>>> {
    handle.read().map_err(|_| Error::internal("index handle poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::IndexConfig;

    fn shared() -> Shared {
        Shared::new(DatabaseConfig::default())
    }

    fn library(dim: usize) -> Library {
        Library::new(LibraryId::new(1), "lib", dim, IndexConfig::Flat, Metadata::new())
    }

    #[test]
    fn validate_embedding_checks_dim_and_zero() {
        let state = shared();
        let lib = library(3);
        assert!(state.validate_embedding(&lib, &[1.0, 0.0, 0.0]).is_ok());
        assert!(state.validate_embedding(&lib, &[1.0, 0.0]).is_err());
        assert!(state.validate_embedding(&lib, &[0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn validate_draft_rejects_empty_text() {
        let state = shared();
        let lib = library(2);
        let draft = ChunkDraft::new(0, "", vec![1.0, 0.0]);
        assert!(state.validate_draft(&lib, &draft).is_err());
    }

    #[test]
    fn retry_on_conflict_bounded() {
        let state = shared();
        let mut calls = 0;
        let result: Result<()> = state.retry_on_conflict(|| {
            calls += 1;
            Err(Error::conflict("always stale"))
        });
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_on_conflict_passes_through_success() {
        let state = shared();
        let mut calls = 0;
        let result = state.retry_on_conflict(|| {
            calls += 1;
            if calls == 1 {
                Err(Error::conflict("stale once"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.expect("recovers"), 2);
    }
}

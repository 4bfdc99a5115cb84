//! Chunk use cases.

use tracing::debug;

use quiver_core::{Chunk, ChunkId, DocumentId, LibraryId, Metadata};

use crate::error::{Error, Result};

use super::{write_index, ChunkDraft, SharedState};

/// Field updates for an existing chunk. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ChunkPatch {
    /// New text; must not be empty.
    pub text: Option<String>,
    /// New position.
    pub position: Option<usize>,
    /// New embedding; must match the library dimension and be non-zero.
    pub embedding: Option<Vec<f32>>,
    /// Replacement metadata.
    pub metadata: Option<Metadata>,
}

impl ChunkPatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the position.
    #[must_use]
    pub const fn position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the embedding.
    #[must_use]
    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One item of a bulk upsert: an update when `id` is given, a create
/// otherwise.
#[derive(Debug, Clone)]
pub struct ChunkUpsert {
    /// Target chunk for an update; `None` creates a new chunk.
    pub id: Option<ChunkId>,
    /// The document the chunk belongs to, if any.
    pub document_id: Option<DocumentId>,
    /// The chunk content.
    pub draft: ChunkDraft,
}

impl ChunkUpsert {
    /// An upsert that creates a new chunk.
    #[must_use]
    pub const fn create(document_id: Option<DocumentId>, draft: ChunkDraft) -> Self {
        Self { id: None, document_id, draft }
    }

    /// An upsert that updates an existing chunk.
    #[must_use]
    pub const fn update(id: ChunkId, document_id: Option<DocumentId>, draft: ChunkDraft) -> Self {
        Self { id: Some(id), document_id, draft }
    }
}

/// Undo-log entry for a bulk upsert in progress.
enum Applied {
    Created(ChunkId),
    Updated { previous: Chunk },
}

/// Chunk lifecycle operations.
#[derive(Clone)]
pub struct ChunkService {
    state: SharedState,
}

impl ChunkService {
    pub(crate) fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Create a chunk, optionally attached to a document.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` / `Error::DocumentNotFound` for missing
    /// owners; validation errors for membership, dimension, zero-vector, or
    /// empty-text failures.
    pub fn create(
        &self,
        library_id: LibraryId,
        document_id: Option<DocumentId>,
        draft: ChunkDraft,
    ) -> Result<Chunk> {
        let lock = self.state.locks.handle(library_id)?;
        let _guard = lock.write()?;

        let library = self.state.require_library(library_id)?;
        self.state.validate_document_membership(library_id, document_id)?;
        self.state.validate_draft(&library, &draft)?;

        let chunk = Chunk::new(
            self.state.ids.next_chunk_id(),
            library_id,
            document_id,
            draft.position,
            draft.text,
            draft.embedding,
            draft.metadata,
        );
        self.state.chunks.insert(chunk.clone())?;

        let index_handle = self.state.indexes.get(library_id)?;
        if let Err(err) = write_index(&index_handle)?.add(chunk.id, &chunk.embedding) {
            self.state.chunks.remove(chunk.id)?;
            return Err(err.into());
        }

        debug!(chunk = %chunk.id, library = %library_id, "created chunk");
        Ok(chunk)
    }

    /// Get a chunk by id.
    ///
    /// # Errors
    ///
    /// `Error::ChunkNotFound` when absent.
    pub fn get(&self, chunk_id: ChunkId) -> Result<Chunk> {
        self.state.require_chunk(chunk_id)
    }

    /// List a library's chunks in insertion order, paged.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when the library is absent.
    pub fn list_by_library(
        &self,
        library_id: LibraryId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Chunk>> {
        let lock = self.state.locks.handle(library_id)?;
        let _guard = lock.read()?;
        self.state.require_library(library_id)?;
        self.state.chunks.list_by_library(library_id, limit, offset)
    }

    /// List a document's chunks ordered by position.
    ///
    /// # Errors
    ///
    /// `Error::DocumentNotFound` when the document is absent.
    pub fn list_by_document(&self, document_id: DocumentId) -> Result<Vec<Chunk>> {
        let document =
            self.state.documents.get(document_id)?.ok_or(Error::DocumentNotFound(document_id))?;
        let lock = self.state.locks.handle(document.library_id)?;
        let _guard = lock.read()?;
        self.state.chunks.list_by_document(document_id)
    }

    /// Apply a batch of creates and updates transactionally: either every
    /// item lands (one version bump per updated chunk) or nothing persists.
    ///
    /// # Errors
    ///
    /// Any validation or not-found failure aborts the batch before anything
    /// is applied; later failures roll back the applied prefix.
    pub fn bulk_upsert(
        &self,
        library_id: LibraryId,
        items: Vec<ChunkUpsert>,
    ) -> Result<Vec<Chunk>> {
        let lock = self.state.locks.handle(library_id)?;
        let _guard = lock.write()?;

        let library = self.state.require_library(library_id)?;
        for item in &items {
            self.state.validate_document_membership(library_id, item.document_id)?;
            self.state.validate_draft(&library, &item.draft)?;
            if let Some(id) = item.id {
                let existing = self.state.require_chunk(id)?;
                if existing.library_id != library_id {
                    return Err(Error::validation(format!(
                        "chunk {id} does not belong to library {library_id}"
                    )));
                }
            }
        }

        let index_handle = self.state.indexes.get(library_id)?;
        let mut index = write_index(&index_handle)?;
        let mut applied: Vec<Applied> = Vec::with_capacity(items.len());
        let mut results: Vec<Chunk> = Vec::with_capacity(items.len());

        for item in items {
            match self.apply_one(&mut **index, library_id, item, &mut applied) {
                Ok(chunk) => results.push(chunk),
                Err(err) => {
                    self.rollback(&mut **index, applied)?;
                    return Err(err);
                }
            }
        }
        drop(index);

        debug!(library = %library_id, chunks = results.len(), "bulk upsert committed");
        Ok(results)
    }

    fn apply_one(
        &self,
        index: &mut dyn quiver_index::VectorIndex,
        library_id: LibraryId,
        item: ChunkUpsert,
        applied: &mut Vec<Applied>,
    ) -> Result<Chunk> {
        match item.id {
            None => {
                let chunk = Chunk::new(
                    self.state.ids.next_chunk_id(),
                    library_id,
                    item.document_id,
                    item.draft.position,
                    item.draft.text,
                    item.draft.embedding,
                    item.draft.metadata,
                );
                self.state.chunks.insert(chunk.clone())?;
                applied.push(Applied::Created(chunk.id));
                index.add(chunk.id, &chunk.embedding)?;
                Ok(chunk)
            }
            Some(id) => {
                let previous = self.state.require_chunk(id)?;
                let draft = item.draft;
                let document_id = item.document_id;
                let updated = self.state.chunks.update_if_version(id, previous.version, |c| {
                    c.document_id = document_id;
                    c.position = draft.position;
                    c.text = draft.text;
                    c.embedding = draft.embedding;
                    c.metadata = draft.metadata;
                })?;
                applied.push(Applied::Updated { previous });
                index.update(id, &updated.embedding)?;
                Ok(updated)
            }
        }
    }

    fn rollback(
        &self,
        index: &mut dyn quiver_index::VectorIndex,
        applied: Vec<Applied>,
    ) -> Result<()> {
        for entry in applied.into_iter().rev() {
            match entry {
                Applied::Created(id) => {
                    index.remove(id);
                    self.state.chunks.remove(id)?;
                }
                Applied::Updated { previous } => {
                    // The vector may or may not have been replaced before
                    // the failure; re-pointing it at the previous embedding
                    // covers both cases.
                    let _ = index.update(previous.id, &previous.embedding);
                    self.state.chunks.restore(previous)?;
                }
            }
        }
        Ok(())
    }

    /// Update a chunk under a caller-pinned version check.
    ///
    /// # Errors
    ///
    /// `Error::ChunkNotFound` when absent, `Error::Conflict` when
    /// `expected_version` is stale, validation errors for bad fields. An
    /// index failure reverts the repository write before returning.
    pub fn update(
        &self,
        chunk_id: ChunkId,
        patch: ChunkPatch,
        expected_version: u64,
    ) -> Result<Chunk> {
        let current = self.state.require_chunk(chunk_id)?;
        let library = self.state.require_library(current.library_id)?;

        if let Some(text) = &patch.text {
            if text.is_empty() {
                return Err(Error::validation("chunk text must not be empty"));
            }
        }
        if let Some(embedding) = &patch.embedding {
            self.state.validate_embedding(&library, embedding)?;
        }

        let lock = self.state.locks.handle(current.library_id)?;
        let _guard = lock.write()?;

        let previous = self.state.require_chunk(chunk_id)?;
        let embedding_changed = patch.embedding.is_some();
        let updated = self.state.chunks.update_if_version(chunk_id, expected_version, |c| {
            if let Some(text) = patch.text {
                c.text = text;
            }
            if let Some(position) = patch.position {
                c.position = position;
            }
            if let Some(embedding) = patch.embedding {
                c.embedding = embedding;
            }
            if let Some(metadata) = patch.metadata {
                c.metadata = metadata;
            }
        })?;

        if embedding_changed {
            let index_handle = self.state.indexes.get(updated.library_id)?;
            let mut guard = write_index(&index_handle)?;
            if let Err(err) = guard.update(chunk_id, &updated.embedding) {
                drop(guard);
                self.state.chunks.restore(previous)?;
                return Err(err.into());
            }
        }

        debug!(chunk = %chunk_id, version = updated.version, "updated chunk");
        Ok(updated)
    }

    /// Delete a chunk and its index entry.
    ///
    /// # Errors
    ///
    /// `Error::ChunkNotFound` when absent.
    pub fn delete(&self, chunk_id: ChunkId) -> Result<()> {
        // A concurrent document move can re-home the chunk between the
        // lookup and the lock; re-check under the lock and retry against
        // the new owner.
        self.state.retry_on_conflict(|| {
            let chunk = self.state.require_chunk(chunk_id)?;
            let lock = self.state.locks.handle(chunk.library_id)?;
            let _guard = lock.write()?;

            let current = self.state.require_chunk(chunk_id)?;
            if current.library_id != chunk.library_id {
                return Err(Error::conflict(format!("chunk {chunk_id} moved during delete")));
            }
            let index_handle = self.state.indexes.get(current.library_id)?;
            write_index(&index_handle)?.remove(chunk_id);
            self.state.chunks.remove(chunk_id)?;

            debug!(chunk = %chunk_id, "deleted chunk");
            Ok(())
        })
    }
}

//! Document use cases.

use tracing::{debug, info};

use quiver_core::{Chunk, Document, DocumentId, LibraryId, Metadata};

use crate::error::{Error, Result};
use crate::lock::ordered_pair;

use super::{write_index, ChunkDraft, SharedState};

/// Document lifecycle operations, including the document-with-chunks
/// compound create and cross-library moves.
#[derive(Clone)]
pub struct DocumentService {
    state: SharedState,
}

impl DocumentService {
    pub(crate) fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Create an empty document in a library.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when the library is absent.
    pub fn create(&self, library_id: LibraryId, metadata: Metadata) -> Result<Document> {
        let lock = self.state.locks.handle(library_id)?;
        let _guard = lock.write()?;

        self.state.require_library(library_id)?;
        let document = Document::new(self.state.ids.next_document_id(), library_id, metadata);
        self.state.documents.insert(document.clone())?;

        debug!(document = %document.id, library = %library_id, "created document");
        Ok(document)
    }

    /// Create a document and its chunks atomically: either the document and
    /// every chunk land, or nothing does.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when the library is absent; validation
    /// errors when any draft fails dimension, zero-vector, or text checks.
    pub fn create_with_chunks(
        &self,
        library_id: LibraryId,
        metadata: Metadata,
        drafts: Vec<ChunkDraft>,
    ) -> Result<(Document, Vec<Chunk>)> {
        let lock = self.state.locks.handle(library_id)?;
        let _guard = lock.write()?;

        let library = self.state.require_library(library_id)?;
        for draft in &drafts {
            self.state.validate_draft(&library, draft)?;
        }

        let index_handle = self.state.indexes.get(library_id)?;
        let document = Document::new(self.state.ids.next_document_id(), library_id, metadata);
        self.state.documents.insert(document.clone())?;

        let mut index = write_index(&index_handle)?;
        let mut created: Vec<Chunk> = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let chunk = Chunk::new(
                self.state.ids.next_chunk_id(),
                library_id,
                Some(document.id),
                draft.position,
                draft.text,
                draft.embedding,
                draft.metadata,
            );
            self.state.chunks.insert(chunk.clone())?;
            if let Err(err) = index.add(chunk.id, &chunk.embedding) {
                self.state.chunks.remove(chunk.id)?;
                for prior in &created {
                    index.remove(prior.id);
                    self.state.chunks.remove(prior.id)?;
                }
                self.state.documents.remove(document.id)?;
                return Err(err.into());
            }
            created.push(chunk);
        }
        drop(index);

        info!(
            document = %document.id,
            library = %library_id,
            chunks = created.len(),
            "created document with chunks"
        );
        Ok((document, created))
    }

    /// Get a document by id.
    ///
    /// # Errors
    ///
    /// `Error::DocumentNotFound` when absent.
    pub fn get(&self, document_id: DocumentId) -> Result<Document> {
        self.state.documents.get(document_id)?.ok_or(Error::DocumentNotFound(document_id))
    }

    /// List a library's documents in insertion order, paged.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when the library is absent.
    pub fn list_by_library(
        &self,
        library_id: LibraryId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>> {
        let lock = self.state.locks.handle(library_id)?;
        let _guard = lock.read()?;
        self.state.require_library(library_id)?;
        self.state.documents.list_by_library(library_id, limit, offset)
    }

    /// Replace a document's metadata.
    ///
    /// With `expected_version` given this is a caller-pinned CAS that
    /// surfaces `Error::Conflict` on staleness. With `None` the service
    /// reads the current version itself and retries a bounded number of
    /// times when a concurrent writer slips between the read and the lock.
    ///
    /// # Errors
    ///
    /// `Error::DocumentNotFound` when absent; `Error::Conflict` on a
    /// persistent version mismatch.
    pub fn update_metadata(
        &self,
        document_id: DocumentId,
        metadata: Metadata,
        expected_version: Option<u64>,
    ) -> Result<Document> {
        match expected_version {
            Some(expected) => self.commit_metadata(document_id, &metadata, expected),
            None => self.state.retry_on_conflict(|| {
                let current = self.get(document_id)?;
                self.commit_metadata(document_id, &metadata, current.version)
            }),
        }
    }

    fn commit_metadata(
        &self,
        document_id: DocumentId,
        metadata: &Metadata,
        expected_version: u64,
    ) -> Result<Document> {
        let document = self.get(document_id)?;
        let lock = self.state.locks.handle(document.library_id)?;
        let _guard = lock.write()?;

        self.state.documents.update_if_version(document_id, expected_version, |d| {
            d.metadata = metadata.clone();
        })
    }

    /// Delete a document and cascade to its chunks and their index entries.
    ///
    /// # Errors
    ///
    /// `Error::DocumentNotFound` when absent.
    pub fn delete(&self, document_id: DocumentId) -> Result<()> {
        // A concurrent move can re-home the document between the lookup and
        // the lock; the re-check under the lock retries against the new
        // owner instead of mutating under the wrong library's lock.
        self.state.retry_on_conflict(|| {
            let document = self.get(document_id)?;
            let lock = self.state.locks.handle(document.library_id)?;
            let _guard = lock.write()?;

            let current = self.get(document_id)?;
            if current.library_id != document.library_id {
                return Err(Error::conflict(format!(
                    "document {document_id} moved during delete"
                )));
            }
            let index_handle = self.state.indexes.get(current.library_id)?;

            let chunk_ids = self.state.chunks.ids_by_document(document_id)?;
            {
                let mut index = write_index(&index_handle)?;
                for chunk_id in &chunk_ids {
                    index.remove(*chunk_id);
                }
            }
            self.state.chunks.remove_by_document(document_id)?;
            self.state.documents.remove(document_id)?;

            info!(document = %document_id, chunks = chunk_ids.len(), "deleted document");
            Ok(())
        })
    }

    /// Move a document and all its chunks to another library.
    ///
    /// Write locks are taken in ascending library-id order to prevent
    /// deadlock against a concurrent move in the opposite direction.
    ///
    /// # Errors
    ///
    /// Validation errors when the libraries coincide or their dimensions
    /// differ; `Error::DocumentNotFound` when the document is not in the
    /// source library.
    pub fn move_document(
        &self,
        document_id: DocumentId,
        src_library: LibraryId,
        dst_library: LibraryId,
    ) -> Result<Document> {
        if src_library == dst_library {
            return Err(Error::validation("source and destination libraries are the same"));
        }
        self.state
            .retry_on_conflict(|| self.try_move(document_id, src_library, dst_library))
    }

    fn try_move(
        &self,
        document_id: DocumentId,
        src_library: LibraryId,
        dst_library: LibraryId,
    ) -> Result<Document> {
        let src = self.state.require_library(src_library)?;
        let dst = self.state.require_library(dst_library)?;
        if src.embedding_dim != dst.embedding_dim {
            return Err(Error::validation(format!(
                "destination dimension {} differs from source dimension {}",
                dst.embedding_dim, src.embedding_dim
            )));
        }

        let (first, second) = ordered_pair(src_library, dst_library);
        let first_lock = self.state.locks.handle(first)?;
        let second_lock = self.state.locks.handle(second)?;
        let _first_guard = first_lock.write()?;
        let _second_guard = second_lock.write()?;

        let document = self.get(document_id)?;
        if document.library_id != src_library {
            return Err(Error::DocumentNotFound(document_id));
        }

        let src_handle = self.state.indexes.get(src_library)?;
        let dst_handle = self.state.indexes.get(dst_library)?;
        let chunk_list = self.state.chunks.list_by_document(document_id)?;

        let mut src_index = write_index(&src_handle)?;
        let mut dst_index = write_index(&dst_handle)?;
        let mut moved: Vec<Chunk> = Vec::with_capacity(chunk_list.len());
        for chunk in &chunk_list {
            src_index.remove(chunk.id);
            if let Err(err) = dst_index.add(chunk.id, &chunk.embedding) {
                for prior in &moved {
                    dst_index.remove(prior.id);
                    self.state.chunks.restore(prior.clone())?;
                }
                for restored in moved.iter().chain(std::iter::once(chunk)) {
                    let _ = src_index.add(restored.id, &restored.embedding);
                }
                return Err(err.into());
            }
            self.state.chunks.update_if_version(chunk.id, chunk.version, |c| {
                c.library_id = dst_library;
            })?;
            moved.push(chunk.clone());
        }
        drop(src_index);
        drop(dst_index);

        let updated = self.state.documents.update_if_version(document_id, document.version, |d| {
            d.library_id = dst_library;
        })?;

        info!(
            document = %document_id,
            src = %src_library,
            dst = %dst_library,
            chunks = moved.len(),
            "moved document"
        );
        Ok(updated)
    }
}

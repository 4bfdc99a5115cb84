//! Chunk repository.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use quiver_core::{Chunk, ChunkId, DocumentId, LibraryId};

use crate::error::{Error, Result};
use crate::filter::SearchFilter;

#[derive(Debug, Default)]
struct ChunkState {
    chunks: HashMap<ChunkId, Chunk>,
    by_library: HashMap<LibraryId, Vec<ChunkId>>,
    by_document: HashMap<DocumentId, Vec<ChunkId>>,
}

impl ChunkState {
    fn link(&mut self, chunk: &Chunk) {
        self.by_library.entry(chunk.library_id).or_default().push(chunk.id);
        if let Some(document_id) = chunk.document_id {
            self.by_document.entry(document_id).or_default().push(chunk.id);
        }
    }

    fn unlink(&mut self, chunk: &Chunk) {
        if let Some(ids) = self.by_library.get_mut(&chunk.library_id) {
            ids.retain(|c| *c != chunk.id);
            if ids.is_empty() {
                self.by_library.remove(&chunk.library_id);
            }
        }
        if let Some(document_id) = chunk.document_id {
            if let Some(ids) = self.by_document.get_mut(&document_id) {
                ids.retain(|c| *c != chunk.id);
                if ids.is_empty() {
                    self.by_document.remove(&document_id);
                }
            }
        }
    }
}

/// Key-value store of chunks with `chunks_by_library` and
/// `chunks_by_document` secondary maps.
#[derive(Debug, Default)]
pub struct ChunkRepo {
    inner: RwLock<ChunkState>,
}

impl ChunkRepo {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(ChunkState::default()) }
    }

    /// Insert a freshly created chunk.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on an id collision or a poisoned lock.
    pub fn insert(&self, chunk: Chunk) -> Result<()> {
        let mut state = self.write()?;
        if state.chunks.contains_key(&chunk.id) {
            return Err(Error::internal(format!("duplicate chunk id {}", chunk.id)));
        }
        state.link(&chunk);
        state.chunks.insert(chunk.id, chunk);
        Ok(())
    }

    /// Re-insert a previously removed or overwritten chunk verbatim,
    /// preserving its version and timestamps. Used by write paths to revert
    /// a repo mutation after a failed index update.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn restore(&self, chunk: Chunk) -> Result<()> {
        let mut state = self.write()?;
        if let Some(current) = state.chunks.remove(&chunk.id) {
            state.unlink(&current);
        }
        state.link(&chunk);
        state.chunks.insert(chunk.id, chunk);
        Ok(())
    }

    /// Get a deep copy of a chunk.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn get(&self, id: ChunkId) -> Result<Option<Chunk>> {
        Ok(self.read()?.chunks.get(&id).cloned())
    }

    /// Whether a chunk passes `filter`, without copying it out.
    ///
    /// Absent chunks fail the filter.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn matches(&self, id: ChunkId, filter: &SearchFilter) -> Result<bool> {
        Ok(self.read()?.chunks.get(&id).is_some_and(|chunk| filter.matches(chunk)))
    }

    /// List a library's chunks in insertion order, paged.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn list_by_library(
        &self,
        library_id: LibraryId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        let ids = state.by_library.get(&library_id).map(Vec::as_slice).unwrap_or_default();
        Ok(ids
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| state.chunks.get(id).cloned())
            .collect())
    }

    /// List a document's chunks ordered by position, then id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn list_by_document(&self, document_id: DocumentId) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        let ids = state.by_document.get(&document_id).map(Vec::as_slice).unwrap_or_default();
        let mut chunks: Vec<Chunk> =
            ids.iter().filter_map(|id| state.chunks.get(id).cloned()).collect();
        chunks.sort_unstable_by_key(|c| (c.position, c.id));
        Ok(chunks)
    }

    /// All chunk ids belonging to a document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn ids_by_document(&self, document_id: DocumentId) -> Result<Vec<ChunkId>> {
        let state = self.read()?;
        Ok(state.by_document.get(&document_id).cloned().unwrap_or_default())
    }

    /// `(id, embedding)` pairs for every chunk in a library; the rebuild
    /// feed for index construction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn embeddings_by_library(
        &self,
        library_id: LibraryId,
    ) -> Result<Vec<(ChunkId, Vec<f32>)>> {
        let state = self.read()?;
        let ids = state.by_library.get(&library_id).map(Vec::as_slice).unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| state.chunks.get(id).map(|c| (*id, c.embedding.clone())))
            .collect())
    }

    /// Compare-and-swap update.
    ///
    /// When the mutator changes `library_id` or `document_id`, the secondary
    /// maps are re-keyed accordingly.
    ///
    /// # Errors
    ///
    /// `Error::ChunkNotFound` when absent, `Error::Conflict` when the stored
    /// version differs from `expected`.
    pub fn update_if_version(
        &self,
        id: ChunkId,
        expected: u64,
        mutator: impl FnOnce(&mut Chunk),
    ) -> Result<Chunk> {
        let mut state = self.write()?;
        let chunk = state.chunks.get_mut(&id).ok_or(Error::ChunkNotFound(id))?;
        if chunk.version != expected {
            return Err(Error::conflict(format!(
                "chunk {id} is at version {}, expected {expected}",
                chunk.version
            )));
        }

        let old_library = chunk.library_id;
        let old_document = chunk.document_id;
        mutator(chunk);
        chunk.version = expected + 1;
        chunk.updated_at = Utc::now();
        let updated = chunk.clone();

        if updated.library_id != old_library {
            if let Some(ids) = state.by_library.get_mut(&old_library) {
                ids.retain(|c| *c != id);
            }
            state.by_library.entry(updated.library_id).or_default().push(id);
        }
        if updated.document_id != old_document {
            if let Some(old_document) = old_document {
                if let Some(ids) = state.by_document.get_mut(&old_document) {
                    ids.retain(|c| *c != id);
                }
            }
            if let Some(new_document) = updated.document_id {
                state.by_document.entry(new_document).or_default().push(id);
            }
        }
        Ok(updated)
    }

    /// Remove a chunk, returning it if present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn remove(&self, id: ChunkId) -> Result<Option<Chunk>> {
        let mut state = self.write()?;
        let Some(chunk) = state.chunks.remove(&id) else {
            return Ok(None);
        };
        state.unlink(&chunk);
        Ok(Some(chunk))
    }

    /// Remove every chunk belonging to a document, returning them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn remove_by_document(&self, document_id: DocumentId) -> Result<Vec<Chunk>> {
        let mut state = self.write()?;
        let ids = state.by_document.remove(&document_id).unwrap_or_default();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chunk) = state.chunks.remove(&id) {
                if let Some(library_ids) = state.by_library.get_mut(&chunk.library_id) {
                    library_ids.retain(|c| *c != id);
                    if library_ids.is_empty() {
                        state.by_library.remove(&chunk.library_id);
                    }
                }
                removed.push(chunk);
            }
        }
        Ok(removed)
    }

    /// Remove every chunk belonging to a library, returning them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn remove_by_library(&self, library_id: LibraryId) -> Result<Vec<Chunk>> {
        let mut state = self.write()?;
        let ids = state.by_library.remove(&library_id).unwrap_or_default();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chunk) = state.chunks.remove(&id) {
                if let Some(document_id) = chunk.document_id {
                    if let Some(document_ids) = state.by_document.get_mut(&document_id) {
                        document_ids.retain(|c| *c != id);
                        if document_ids.is_empty() {
                            state.by_document.remove(&document_id);
                        }
                    }
                }
                removed.push(chunk);
            }
        }
        Ok(removed)
    }

    /// Deep copies of every chunk, for snapshot persistence.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn all(&self) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        let mut chunks: Vec<Chunk> = state.chunks.values().cloned().collect();
        chunks.sort_unstable_by_key(|c| c.id);
        Ok(chunks)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, ChunkState>> {
        self.inner.read().map_err(|_| Error::internal("chunk repo poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, ChunkState>> {
        self.inner.write().map_err(|_| Error::internal("chunk repo poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use quiver_core::Metadata;

    fn chunk(raw: u64, library: u64, document: Option<u64>, position: usize) -> Chunk {
        Chunk::new(
            ChunkId::new(raw),
            LibraryId::new(library),
            document.map(DocumentId::new),
            position,
            format!("chunk {raw}"),
            vec![1.0, 0.0],
            Metadata::new(),
        )
    }

    #[test]
    fn secondary_maps_stay_coherent() {
        let repo = ChunkRepo::new();
        repo.insert(chunk(1, 10, Some(100), 0)).expect("insert");
        repo.insert(chunk(2, 10, Some(100), 1)).expect("insert");
        repo.insert(chunk(3, 10, None, 0)).expect("insert");

        assert_eq!(repo.list_by_library(LibraryId::new(10), usize::MAX, 0).expect("list").len(), 3);
        assert_eq!(repo.ids_by_document(DocumentId::new(100)).expect("ids").len(), 2);

        repo.remove(ChunkId::new(2)).expect("remove");
        assert_eq!(repo.list_by_library(LibraryId::new(10), usize::MAX, 0).expect("list").len(), 2);
        assert_eq!(
            repo.ids_by_document(DocumentId::new(100)).expect("ids"),
            vec![ChunkId::new(1)]
        );
    }

    #[test]
    fn list_by_document_sorts_by_position_then_id() {
        let repo = ChunkRepo::new();
        repo.insert(chunk(5, 10, Some(100), 2)).expect("insert");
        repo.insert(chunk(9, 10, Some(100), 0)).expect("insert");
        repo.insert(chunk(2, 10, Some(100), 2)).expect("insert");

        let ids: Vec<u64> = repo
            .list_by_document(DocumentId::new(100))
            .expect("list")
            .iter()
            .map(|c| c.id.as_u64())
            .collect();
        assert_eq!(ids, vec![9, 2, 5]);
    }

    #[test]
    fn cas_rekeys_document_membership() {
        let repo = ChunkRepo::new();
        repo.insert(chunk(1, 10, Some(100), 0)).expect("insert");

        repo.update_if_version(ChunkId::new(1), 1, |c| {
            c.document_id = Some(DocumentId::new(200));
        })
        .expect("cas");

        assert!(repo.ids_by_document(DocumentId::new(100)).expect("ids").is_empty());
        assert_eq!(
            repo.ids_by_document(DocumentId::new(200)).expect("ids"),
            vec![ChunkId::new(1)]
        );
    }

    #[test]
    fn cas_stale_is_conflict() {
        let repo = ChunkRepo::new();
        repo.insert(chunk(1, 10, None, 0)).expect("insert");
        repo.update_if_version(ChunkId::new(1), 1, |_| {}).expect("cas");

        let err = repo.update_if_version(ChunkId::new(1), 1, |_| {}).expect_err("stale");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn remove_by_document_returns_removed() {
        let repo = ChunkRepo::new();
        repo.insert(chunk(1, 10, Some(100), 0)).expect("insert");
        repo.insert(chunk(2, 10, Some(100), 1)).expect("insert");
        repo.insert(chunk(3, 10, Some(200), 0)).expect("insert");

        let removed = repo.remove_by_document(DocumentId::new(100)).expect("remove");
        assert_eq!(removed.len(), 2);
        assert_eq!(repo.list_by_library(LibraryId::new(10), usize::MAX, 0).expect("list").len(), 1);
    }

    #[test]
    fn restore_reverts_an_overwrite() {
        let repo = ChunkRepo::new();
        repo.insert(chunk(1, 10, Some(100), 0)).expect("insert");
        let original = repo.get(ChunkId::new(1)).expect("get").expect("present");

        repo.update_if_version(ChunkId::new(1), 1, |c| {
            c.text = "mutated".to_string();
            c.document_id = None;
        })
        .expect("cas");

        repo.restore(original.clone()).expect("restore");
        let restored = repo.get(ChunkId::new(1)).expect("get").expect("present");
        assert_eq!(restored, original);
        assert_eq!(
            repo.ids_by_document(DocumentId::new(100)).expect("ids"),
            vec![ChunkId::new(1)]
        );
    }

    #[test]
    fn matches_checks_filter_in_place() {
        let repo = ChunkRepo::new();
        let mut item = chunk(1, 10, Some(100), 0);
        item.metadata.insert("lang", "en");
        repo.insert(item).expect("insert");

        let filter = SearchFilter::new().metadata_eq("lang", "en");
        assert!(repo.matches(ChunkId::new(1), &filter).expect("matches"));

        let filter = SearchFilter::new().metadata_eq("lang", "fr");
        assert!(!repo.matches(ChunkId::new(1), &filter).expect("matches"));
        assert!(!repo.matches(ChunkId::new(99), &filter).expect("matches"));
    }

    #[test]
    fn embeddings_feed_pairs_ids_with_vectors() {
        let repo = ChunkRepo::new();
        repo.insert(chunk(1, 10, None, 0)).expect("insert");
        repo.insert(chunk(2, 10, None, 1)).expect("insert");

        let feed = repo.embeddings_by_library(LibraryId::new(10)).expect("feed");
        assert_eq!(feed.len(), 2);
        assert!(feed.iter().all(|(_, v)| v == &vec![1.0, 0.0]));
    }
}

//! Document repository.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use quiver_core::{Document, DocumentId, LibraryId};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct DocumentState {
    documents: HashMap<DocumentId, Document>,
    by_library: HashMap<LibraryId, Vec<DocumentId>>,
}

/// Key-value store of documents with a `documents_by_library` secondary map.
#[derive(Debug, Default)]
pub struct DocumentRepo {
    inner: RwLock<DocumentState>,
}

impl DocumentRepo {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(DocumentState::default()) }
    }

    /// Insert a freshly created document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on an id collision or a poisoned lock.
    pub fn insert(&self, document: Document) -> Result<()> {
        let mut state = self.write()?;
        if state.documents.contains_key(&document.id) {
            return Err(Error::internal(format!("duplicate document id {}", document.id)));
        }
        state.by_library.entry(document.library_id).or_default().push(document.id);
        state.documents.insert(document.id, document);
        Ok(())
    }

    /// Get a deep copy of a document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn get(&self, id: DocumentId) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(&id).cloned())
    }

    /// List a library's documents in insertion order, paged.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn list_by_library(
        &self,
        library_id: LibraryId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>> {
        let state = self.read()?;
        let ids = state.by_library.get(&library_id).map(Vec::as_slice).unwrap_or_default();
        Ok(ids
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| state.documents.get(id).cloned())
            .collect())
    }

    /// Compare-and-swap update.
    ///
    /// When the mutator changes `library_id`, the secondary map is re-keyed
    /// accordingly.
    ///
    /// # Errors
    ///
    /// `Error::DocumentNotFound` when absent, `Error::Conflict` when the
    /// stored version differs from `expected`.
    pub fn update_if_version(
        &self,
        id: DocumentId,
        expected: u64,
        mutator: impl FnOnce(&mut Document),
    ) -> Result<Document> {
        let mut state = self.write()?;
        let document = state.documents.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
        if document.version != expected {
            return Err(Error::conflict(format!(
                "document {id} is at version {}, expected {expected}",
                document.version
            )));
        }

        let old_library = document.library_id;
        mutator(document);
        document.version = expected + 1;
        document.updated_at = Utc::now();
        let updated = document.clone();

        if updated.library_id != old_library {
            if let Some(ids) = state.by_library.get_mut(&old_library) {
                ids.retain(|d| *d != id);
            }
            state.by_library.entry(updated.library_id).or_default().push(id);
        }
        Ok(updated)
    }

    /// Remove a document, returning it if present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn remove(&self, id: DocumentId) -> Result<Option<Document>> {
        let mut state = self.write()?;
        let Some(document) = state.documents.remove(&id) else {
            return Ok(None);
        };
        if let Some(ids) = state.by_library.get_mut(&document.library_id) {
            ids.retain(|d| *d != id);
            if ids.is_empty() {
                state.by_library.remove(&document.library_id);
            }
        }
        Ok(Some(document))
    }

    /// Remove every document belonging to a library, returning them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn remove_by_library(&self, library_id: LibraryId) -> Result<Vec<Document>> {
        let mut state = self.write()?;
        let ids = state.by_library.remove(&library_id).unwrap_or_default();
        Ok(ids.iter().filter_map(|id| state.documents.remove(id)).collect())
    }

    /// Deep copies of every document, for snapshot persistence.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn all(&self) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut documents: Vec<Document> = state.documents.values().cloned().collect();
        documents.sort_unstable_by_key(|d| d.id);
        Ok(documents)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, DocumentState>> {
        self.inner.read().map_err(|_| Error::internal("document repo poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, DocumentState>> {
        self.inner.write().map_err(|_| Error::internal("document repo poisoned"))
    }
}

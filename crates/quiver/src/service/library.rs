//! Library use cases.

use tracing::info;

use quiver_core::{IndexConfig, Library, LibraryId, Metadata};

use crate::error::{Error, Result};

use super::SharedState;

/// Library lifecycle operations.
#[derive(Clone)]
pub struct LibraryService {
    state: SharedState,
}

impl LibraryService {
    pub(crate) fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Create a library together with its lock and empty index.
    ///
    /// # Errors
    ///
    /// Validation errors for an empty name, a non-positive or oversized
    /// dimension, or invalid index parameters.
    pub fn create(
        &self,
        name: impl Into<String>,
        embedding_dim: usize,
        index_config: IndexConfig,
        metadata: Metadata,
    ) -> Result<Library> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("library name must not be empty"));
        }
        if embedding_dim == 0 {
            return Err(Error::validation("embedding_dim must be at least 1"));
        }
        if embedding_dim > self.state.config.max_embedding_dim {
            return Err(Error::validation(format!(
                "embedding_dim {embedding_dim} exceeds maximum {}",
                self.state.config.max_embedding_dim
            )));
        }
        index_config.validate()?;

        let id = self.state.ids.next_library_id();
        let lock = self.state.locks.handle(id)?;
        let _guard = lock.write()?;

        let library = Library::new(id, name, embedding_dim, index_config.clone(), metadata);
        self.state.libraries.insert(library.clone())?;
        self.state.indexes.ensure(id, &index_config, embedding_dim, || {
            self.state.chunks.embeddings_by_library(id)
        })?;

        info!(library = %id, strategy = index_config.strategy(), dim = embedding_dim, "created library");
        Ok(library)
    }

    /// Get a library by id.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when absent.
    pub fn get(&self, library_id: LibraryId) -> Result<Library> {
        self.state.require_library(library_id)
    }

    /// List all libraries in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned repository lock.
    pub fn list(&self) -> Result<Vec<Library>> {
        self.state.libraries.list()
    }

    /// Switch a library to a new index configuration.
    ///
    /// The replacement index is fully rebuilt from the library's chunks
    /// before the old one is swapped out, so the change is all-or-nothing.
    ///
    /// # Errors
    ///
    /// `Error::Conflict` when `expected_version` is stale; validation errors
    /// for bad parameters.
    pub fn update_config(
        &self,
        library_id: LibraryId,
        new_config: IndexConfig,
        expected_version: u64,
    ) -> Result<Library> {
        self.commit_config(library_id, new_config, expected_version, false)
    }

    /// Non-blocking variant of [`LibraryService::update_config`].
    ///
    /// Index swaps rebuild the whole index under the write lock, so callers
    /// that cannot afford to wait behind one can probe with this variant.
    ///
    /// # Errors
    ///
    /// `Error::Busy` when the library lock is held, instead of waiting for
    /// it; otherwise as [`LibraryService::update_config`].
    pub fn try_update_config(
        &self,
        library_id: LibraryId,
        new_config: IndexConfig,
        expected_version: u64,
    ) -> Result<Library> {
        self.commit_config(library_id, new_config, expected_version, true)
    }

    fn commit_config(
        &self,
        library_id: LibraryId,
        new_config: IndexConfig,
        expected_version: u64,
        non_blocking: bool,
    ) -> Result<Library> {
        new_config.validate()?;

        let lock = self.state.locks.handle(library_id)?;
        let _guard = if non_blocking { lock.try_write()? } else { lock.write()? };

        let library = self.state.require_library(library_id)?;
        if library.version != expected_version {
            return Err(Error::conflict(format!(
                "library {library_id} is at version {}, expected {expected_version}",
                library.version
            )));
        }

        // Build and populate the replacement before committing anything, so
        // a rebuild failure leaves both the config and the old index intact.
        let items = self.state.chunks.embeddings_by_library(library_id)?;
        self.state.indexes.swap(library_id, &new_config, library.embedding_dim, items)?;

        let updated = self.state.libraries.update_if_version(library_id, expected_version, |l| {
            l.index_config = new_config.clone();
        })?;

        info!(library = %library_id, strategy = new_config.strategy(), "swapped index config");
        Ok(updated)
    }

    /// Delete a library and cascade to its documents, chunks, index, and
    /// lock in one critical section.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when absent.
    pub fn delete(&self, library_id: LibraryId) -> Result<()> {
        let lock = self.state.locks.handle(library_id)?;
        let _guard = lock.write()?;

        self.state.require_library(library_id)?;

        let chunks = self.state.chunks.remove_by_library(library_id)?;
        let documents = self.state.documents.remove_by_library(library_id)?;
        self.state.indexes.drop_index(library_id)?;
        self.state.libraries.remove(library_id)?;
        self.state.locks.remove(library_id)?;

        info!(
            library = %library_id,
            documents = documents.len(),
            chunks = chunks.len(),
            "deleted library"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::DatabaseConfig;
    use crate::error::ErrorKind;
    use crate::service::{Shared, SharedState};

    fn state() -> SharedState {
        Arc::new(Shared::new(DatabaseConfig::default()))
    }

    #[test]
    fn try_update_config_reports_busy_under_contention() {
        let state = state();
        let libraries = LibraryService::new(Arc::clone(&state));
        let library = libraries
            .create("lib", 2, IndexConfig::Flat, Metadata::new())
            .expect("failed to create library");

        let lock = state.locks.handle(library.id).expect("handle");
        let guard = lock.read().expect("read");
        let err = libraries
            .try_update_config(library.id, IndexConfig::lsh_default(), 1)
            .expect_err("reader holds the lock");
        assert_eq!(err.kind(), ErrorKind::Busy);

        // Nothing committed while contended.
        assert_eq!(libraries.get(library.id).expect("get").index_config, IndexConfig::Flat);
        drop(guard);

        let updated = libraries
            .try_update_config(library.id, IndexConfig::lsh_default(), 1)
            .expect("uncontended try_update_config");
        assert_eq!(updated.version, 2);
        assert_eq!(updated.index_config, IndexConfig::lsh_default());
    }
}

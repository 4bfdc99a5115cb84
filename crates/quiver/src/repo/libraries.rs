//! Library repository.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use quiver_core::{Library, LibraryId};

use crate::error::{Error, Result};

/// Key-value store of libraries.
#[derive(Debug, Default)]
pub struct LibraryRepo {
    inner: RwLock<HashMap<LibraryId, Library>>,
}

impl LibraryRepo {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    /// Insert a freshly created library.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on an id collision or a poisoned lock.
    pub fn insert(&self, library: Library) -> Result<()> {
        let mut map = self.write()?;
        if map.contains_key(&library.id) {
            return Err(Error::internal(format!("duplicate library id {}", library.id)));
        }
        map.insert(library.id, library);
        Ok(())
    }

    /// Get a deep copy of a library.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn get(&self, id: LibraryId) -> Result<Option<Library>> {
        Ok(self.read()?.get(&id).cloned())
    }

    /// List all libraries in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn list(&self) -> Result<Vec<Library>> {
        let map = self.read()?;
        let mut libraries: Vec<Library> = map.values().cloned().collect();
        libraries.sort_unstable_by_key(|l| l.id);
        Ok(libraries)
    }

    /// All library ids, ascending.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn ids(&self) -> Result<Vec<LibraryId>> {
        let map = self.read()?;
        let mut ids: Vec<LibraryId> = map.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Compare-and-swap update.
    ///
    /// # Errors
    ///
    /// `Error::LibraryNotFound` when absent, `Error::Conflict` when the
    /// stored version differs from `expected`.
    pub fn update_if_version(
        &self,
        id: LibraryId,
        expected: u64,
        mutator: impl FnOnce(&mut Library),
    ) -> Result<Library> {
        let mut map = self.write()?;
        let library = map.get_mut(&id).ok_or(Error::LibraryNotFound(id))?;
        if library.version != expected {
            return Err(Error::conflict(format!(
                "library {id} is at version {}, expected {expected}",
                library.version
            )));
        }
        mutator(library);
        library.version = expected + 1;
        library.updated_at = Utc::now();
        Ok(library.clone())
    }

    /// Remove a library, returning it if present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on a poisoned lock.
    pub fn remove(&self, id: LibraryId) -> Result<Option<Library>> {
        Ok(self.write()?.remove(&id))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<LibraryId, Library>>> {
        self.inner.read().map_err(|_| Error::internal("library repo poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<LibraryId, Library>>> {
        self.inner.write().map_err(|_| Error::internal("library repo poisoned"))
    }
}

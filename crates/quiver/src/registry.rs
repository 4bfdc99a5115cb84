//! Per-library index registry.
//!
//! Owns one [`VectorIndex`] per library behind an `Arc<RwLock<..>>` handle.
//! A short internal mutex covers only the map lookups; mutation of an index
//! is authorized by the owning library's write lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use quiver_core::{ChunkId, IndexConfig, LibraryId};
use quiver_index::{build_index, VectorIndex};

use crate::error::{Error, Result};

/// Shared handle to one library's index.
///
/// Holders take the inner read lock to search and the inner write lock to
/// mutate; the library lock already serializes writers, so the inner lock is
/// uncontended in practice and exists to make the handle `Sync`.
pub type IndexHandle = Arc<RwLock<Box<dyn VectorIndex>>>;

/// One registered index plus the configuration it was built with.
///
/// The config and dimension are kept so `ensure` can detect a change and
/// rebuild instead of handing back a stale strategy.
struct IndexEntry {
    config: IndexConfig,
    dim: usize,
    handle: IndexHandle,
}

/// Registry mapping each library to its current index instance.
#[derive(Default)]
pub struct IndexRegistry {
    indexes: Mutex<HashMap<LibraryId, IndexEntry>>,
}

impl IndexRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { indexes: Mutex::new(HashMap::new()) }
    }

    /// The deterministic RNG seed for a library's index.
    ///
    /// Deriving the seed from the library id makes LSH hyperplanes and IVF
    /// training reproducible across process restarts.
    #[must_use]
    pub fn seed_for(library_id: LibraryId) -> u64 {
        library_id.as_u64()
    }

    /// Idempotently make sure the library's index matches `config` and
    /// `dim`.
    ///
    /// Creates an empty index when none is registered. When one exists but
    /// was built with a different config or dimension, a replacement is
    /// built, populated from `rebuild_feed`, and swapped in through the
    /// existing handle; otherwise the current handle is returned untouched.
    /// The feed is only invoked for that rebuild case.
    ///
    /// # Errors
    ///
    /// Propagates feed failures, and rebuild failures as `Error::Internal`.
    pub fn ensure<F>(
        &self,
        library_id: LibraryId,
        config: &IndexConfig,
        dim: usize,
        rebuild_feed: F,
    ) -> Result<IndexHandle>
    where
        F: FnOnce() -> Result<Vec<(ChunkId, Vec<f32>)>>,
    {
        let stale = {
            let mut indexes = self.guard()?;
            match indexes.get(&library_id) {
                None => {
                    let handle: IndexHandle = Arc::new(RwLock::new(build_index(
                        config,
                        dim,
                        Self::seed_for(library_id),
                    )));
                    indexes.insert(
                        library_id,
                        IndexEntry { config: config.clone(), dim, handle: Arc::clone(&handle) },
                    );
                    return Ok(handle);
                }
                Some(entry) if entry.config == *config && entry.dim == dim => {
                    return Ok(Arc::clone(&entry.handle));
                }
                Some(entry) => Arc::clone(&entry.handle),
            }
        };

        // The registered config or dimension differs: rebuild outside the
        // registry mutex, then swap in place so outstanding handles follow.
        let mut next = build_index(config, dim, Self::seed_for(library_id));
        next.rebuild(rebuild_feed()?)
            .map_err(|e| Error::internal(format!("index rebuild failed: {e}")))?;
        {
            let mut current =
                stale.write().map_err(|_| Error::internal("index handle poisoned"))?;
            *current = next;
        }

        let mut indexes = self.guard()?;
        if let Some(entry) = indexes.get_mut(&library_id) {
            entry.config = config.clone();
            entry.dim = dim;
        }
        Ok(stale)
    }

    /// Get the current index handle for a library.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` when no index is registered: services
    /// create the index together with the library, so absence means the
    /// registry diverged from the library store.
    pub fn get(&self, library_id: LibraryId) -> Result<IndexHandle> {
        let indexes = self.guard()?;
        indexes
            .get(&library_id)
            .map(|entry| Arc::clone(&entry.handle))
            .ok_or_else(|| Error::internal(format!("no index registered for library {library_id}")))
    }

    /// Build a new index from `config`, rebuild it from `items`, and swap it
    /// in as the library's current index.
    ///
    /// The swap is all-or-nothing: the new index is fully constructed before
    /// the handle is replaced, and on any rebuild failure the prior index is
    /// retained. Callers must hold the library's write lock.
    ///
    /// # Errors
    ///
    /// Propagates rebuild failures as `Error::Internal` (the items come from
    /// the chunk store, which only holds validated vectors).
    pub fn swap(
        &self,
        library_id: LibraryId,
        config: &IndexConfig,
        dim: usize,
        items: Vec<(ChunkId, Vec<f32>)>,
    ) -> Result<()> {
        let mut next = build_index(config, dim, Self::seed_for(library_id));
        next.rebuild(items)
            .map_err(|e| Error::internal(format!("index rebuild failed: {e}")))?;

        let handle = self.get(library_id)?;
        {
            let mut current =
                handle.write().map_err(|_| Error::internal("index handle poisoned"))?;
            *current = next;
        }

        let mut indexes = self.guard()?;
        if let Some(entry) = indexes.get_mut(&library_id) {
            entry.config = config.clone();
            entry.dim = dim;
        }
        Ok(())
    }

    /// Release the index for a deleted library.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the registry mutex was poisoned.
    pub fn drop_index(&self, library_id: LibraryId) -> Result<()> {
        let mut indexes = self.guard()?;
        indexes.remove(&library_id);
        Ok(())
    }

    /// Whether an index is registered for the library.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the registry mutex was poisoned.
    pub fn contains(&self, library_id: LibraryId) -> Result<bool> {
        let indexes = self.guard()?;
        Ok(indexes.contains_key(&library_id))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<LibraryId, IndexEntry>>> {
        self.indexes.lock().map_err(|_| Error::internal("index registry poisoned"))
    }
}

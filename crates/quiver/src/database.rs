//! Main database interface.
//!
//! [`Database`] is the entry point: it owns the repositories, the lock and
//! index registries, and hands out the service facades that implement every
//! use case.
//!
//! # Examples
//!
//! ```ignore
//! use quiver::{ChunkDraft, Database, IndexConfig, Metadata};
//!
//! let db = Database::new();
//! let library = db.libraries().create("papers", 3, IndexConfig::Flat, Metadata::new())?;
//! db.chunks().create(
//!     library.id,
//!     None,
//!     ChunkDraft::new(0, "hello", vec![1.0, 0.0, 0.0]),
//! )?;
//!
//! let hits = db.search().search(library.id, &[1.0, 0.0, 0.0], 5, None)?;
//! ```
//!
//! With a snapshot path, `open` loads persisted entities and rebuilds every
//! index before returning:
//!
//! ```ignore
//! let db = Database::open("library.quiver.json")?;
//! db.save()?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::{DatabaseBuilder, DatabaseConfig};
use crate::error::{Error, Result};
use crate::service::{
    ChunkService, DocumentService, LibraryService, SearchService, Shared, SharedState,
};
use crate::snapshot::Snapshot;

/// The in-process vector database.
///
/// `Database` is `Send + Sync`; clones share the same underlying state.
/// Per-library reader/writer locks serialize mutations, and readers always
/// receive deep copies.
#[derive(Clone)]
pub struct Database {
    state: SharedState,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Create an empty in-memory database with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self { state: Arc::new(Shared::new(DatabaseConfig::default())) }
    }

    /// Start building a database with custom configuration.
    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Open a database backed by a JSON snapshot at `path`.
    ///
    /// Equivalent to `Database::builder().snapshot_path(path).open()`.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing snapshot cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().snapshot_path(path).open()
    }

    pub(crate) fn open_with_config(config: DatabaseConfig) -> Result<Self> {
        let snapshot_path = config.snapshot_path.clone();
        let db = Self { state: Arc::new(Shared::new(config)) };
        if let Some(path) = snapshot_path {
            if let Some(snapshot) = Snapshot::load(&path)? {
                db.restore(snapshot)?;
            }
        }
        Ok(db)
    }

    /// Library operations.
    #[must_use]
    pub fn libraries(&self) -> LibraryService {
        LibraryService::new(Arc::clone(&self.state))
    }

    /// Document operations.
    #[must_use]
    pub fn documents(&self) -> DocumentService {
        DocumentService::new(Arc::clone(&self.state))
    }

    /// Chunk operations.
    #[must_use]
    pub fn chunks(&self) -> ChunkService {
        ChunkService::new(Arc::clone(&self.state))
    }

    /// Similarity search.
    #[must_use]
    pub fn search(&self) -> SearchService {
        SearchService::new(Arc::clone(&self.state))
    }

    /// Write a snapshot to the configured path.
    ///
    /// # Errors
    ///
    /// `Error::Validation` when no snapshot path is configured; I/O and
    /// encoding failures surface as `Error::Internal`.
    pub fn save(&self) -> Result<()> {
        let path = self
            .state
            .config
            .snapshot_path
            .clone()
            .ok_or_else(|| Error::validation("no snapshot path configured"))?;
        self.save_to(&path)
    }

    /// Write a snapshot to an explicit path.
    ///
    /// # Errors
    ///
    /// I/O and encoding failures surface as `Error::Internal`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        Snapshot::capture(&self.state)?.write(path)
    }

    /// Populate the stores from a snapshot, then rebuild all indexes.
    fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let max_id = snapshot.max_id();
        for library in snapshot.libraries {
            self.state.locks.handle(library.id)?;
            self.state.libraries.insert(library)?;
        }
        for document in snapshot.documents {
            self.state.documents.insert(document)?;
        }
        for chunk in snapshot.chunks {
            self.state.chunks.insert(chunk)?;
        }
        self.state.ids.advance_past(max_id);
        self.rebuild_indexes()
    }

    /// Rebuild every library's index from the chunk store, write-locking
    /// libraries one at a time.
    ///
    /// # Errors
    ///
    /// `Error::Internal` when a stored chunk fails index validation, which
    /// indicates a corrupt snapshot.
    pub fn rebuild_indexes(&self) -> Result<()> {
        for library_id in self.state.libraries.ids()? {
            let lock = self.state.locks.handle(library_id)?;
            let _guard = lock.write()?;

            let Some(library) = self.state.libraries.get(library_id)? else {
                continue;
            };
            self.state.indexes.ensure(library_id, &library.index_config, library.embedding_dim, || {
                self.state.chunks.embeddings_by_library(library_id)
            })?;
            let items = self.state.chunks.embeddings_by_library(library_id)?;
            self.state.indexes.swap(
                library_id,
                &library.index_config,
                library.embedding_dim,
                items,
            )?;
            info!(library = %library_id, "rebuilt index");
        }
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

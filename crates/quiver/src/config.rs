//! Database configuration.

use std::path::PathBuf;

use crate::database::Database;
use crate::error::Result;

/// Default bound on CAS retries for service-internal writers.
pub const DEFAULT_CAS_MAX_RETRIES: u32 = 3;

/// Default upper bound on a library's embedding dimension.
pub const DEFAULT_MAX_EMBEDDING_DIM: usize = 8192;

/// Configuration for a [`Database`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Where to load and save the JSON snapshot; `None` disables
    /// persistence.
    pub snapshot_path: Option<PathBuf>,
    /// How many times service-internal writers retry a stale CAS before
    /// surfacing a conflict.
    pub cas_max_retries: u32,
    /// Upper bound on `embedding_dim` accepted at library creation.
    pub max_embedding_dim: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            cas_max_retries: DEFAULT_CAS_MAX_RETRIES,
            max_embedding_dim: DEFAULT_MAX_EMBEDDING_DIM,
        }
    }
}

/// Builder for opening a [`Database`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use quiver::Database;
///
/// let db = Database::builder()
///     .snapshot_path("library.quiver.json")
///     .cas_max_retries(5)
///     .open()?;
/// ```
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    config: DatabaseConfig,
}

impl DatabaseBuilder {
    /// Create a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the snapshot path used by load-on-open and
    /// [`Database::save`].
    #[must_use]
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    /// Set the CAS retry bound for service-internal writers.
    #[must_use]
    pub const fn cas_max_retries(mut self, retries: u32) -> Self {
        self.config.cas_max_retries = retries;
        self
    }

    /// Set the upper bound on accepted embedding dimensions.
    #[must_use]
    pub const fn max_embedding_dim(mut self, dim: usize) -> Self {
        self.config.max_embedding_dim = dim;
        self
    }

    /// Open the database: load the snapshot when one is configured and
    /// present, then rebuild every library's index.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot exists but cannot be read or
    /// parsed, or when index rebuilding fails.
    pub fn open(self) -> Result<Database> {
        Database::open_with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DatabaseConfig::default();
        assert!(config.snapshot_path.is_none());
        assert_eq!(config.cas_max_retries, 3);
        assert_eq!(config.max_embedding_dim, 8192);
    }

    #[test]
    fn builder_overrides() {
        let builder = DatabaseBuilder::new()
            .snapshot_path("/tmp/snap.json")
            .cas_max_retries(7)
            .max_embedding_dim(256);
        assert_eq!(builder.config.cas_max_retries, 7);
        assert_eq!(builder.config.max_embedding_dim, 256);
        assert!(builder.config.snapshot_path.is_some());
    }
}

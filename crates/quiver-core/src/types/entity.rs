//! Entity types: [`Library`], [`Document`], and [`Chunk`].
//!
//! Every entity carries a monotonically advancing `version` (starting at 1)
//! and creation/update timestamps. Versions advance only through the
//! repository CAS path; constructors always produce version 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::IndexConfig;
use super::id::{ChunkId, DocumentId, LibraryId};
use super::metadata::Metadata;

/// A library: the top-level container with a fixed embedding dimension and
/// a single vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    /// Unique identifier.
    pub id: LibraryId,
    /// Human-readable name.
    pub name: String,
    /// Embedding dimension; immutable after creation.
    pub embedding_dim: usize,
    /// The index strategy for this library's chunks.
    pub index_config: IndexConfig,
    /// Free-form metadata.
    pub metadata: Metadata,
    /// Optimistic-concurrency version, starting at 1.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Library {
    /// Create a new library at version 1.
    #[must_use]
    pub fn new(
        id: LibraryId,
        name: impl Into<String>,
        embedding_dim: usize,
        index_config: IndexConfig,
        metadata: Metadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            embedding_dim,
            index_config,
            metadata,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A document: an optional grouping of chunks within a library.
///
/// Documents carry no vector of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,
    /// The owning library.
    pub library_id: LibraryId,
    /// Free-form metadata.
    pub metadata: Metadata,
    /// Optimistic-concurrency version, starting at 1.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document at version 1.
    #[must_use]
    pub fn new(id: DocumentId, library_id: LibraryId, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self { id, library_id, metadata, version: 1, created_at: now, updated_at: now }
    }
}

/// A chunk: the indexable unit, text plus a pre-computed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier.
    pub id: ChunkId,
    /// The owning library.
    pub library_id: LibraryId,
    /// The owning document, if the chunk belongs to one.
    pub document_id: Option<DocumentId>,
    /// Ordinal sort key within the chunk's document.
    pub position: usize,
    /// The chunk text.
    pub text: String,
    /// The embedding; its length must equal the library's `embedding_dim`.
    pub embedding: Vec<f32>,
    /// Free-form metadata.
    pub metadata: Metadata,
    /// Optimistic-concurrency version, starting at 1.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a new chunk at version 1.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: ChunkId,
        library_id: LibraryId,
        document_id: Option<DocumentId>,
        position: usize,
        text: impl Into<String>,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            library_id,
            document_id,
            position,
            text: text.into(),
            embedding,
            metadata,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

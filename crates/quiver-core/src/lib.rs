//! Core types for the Quiver vector database.
//!
//! This crate defines the entity model shared by the rest of the workspace:
//! typed identifiers, the [`Library`]/[`Document`]/[`Chunk`] entities with
//! optimistic-concurrency versions, free-form [`Metadata`], and the
//! per-library [`IndexConfig`].

mod id_gen;
pub mod types;

pub use id_gen::IdGenerator;
pub use types::{
    Chunk, ChunkId, ConfigError, Document, DocumentId, IndexConfig, Library, LibraryId, Metadata,
};

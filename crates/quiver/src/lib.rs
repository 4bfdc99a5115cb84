//! Quiver - an in-process vector database for document-chunk libraries.
//!
//! Libraries hold chunks with pre-computed embeddings behind one of three
//! interchangeable ANN strategies (flat exact, random-hyperplane LSH,
//! k-means IVF). Mutations are serialized by per-library reader/writer
//! locks and committed through optimistic version CAS; readers always see
//! deep copies and consistent snapshots.
//!
//! # Quick Start
//!
//! ```ignore
//! use quiver::{ChunkDraft, Database, IndexConfig, Metadata};
//!
//! let db = Database::new();
//!
//! let library = db.libraries().create(
//!     "papers",
//!     384,
//!     IndexConfig::lsh_default(),
//!     Metadata::new(),
//! )?;
//!
//! let (doc, chunks) = db.documents().create_with_chunks(
//!     library.id,
//!     Metadata::new(),
//!     vec![ChunkDraft::new(0, "first chunk", embedding)],
//! )?;
//!
//! let hits = db.search().search(library.id, &query, 10, None)?;
//! for hit in hits {
//!     println!("{} {:.4} {}", hit.chunk_id, hit.score, hit.chunk.text);
//! }
//! ```
//!
//! # Concurrency
//!
//! Every mutating use case on a library runs under that library's write
//! lock in a fixed order: validate, write repositories, update the index,
//! CAS-commit the owning entity, release. A failed index update reverts the
//! repository write before the lock is released, so concurrent readers
//! never observe torn state. Operations spanning two libraries take their
//! write locks in ascending id order.
//!
//! # Persistence
//!
//! [`Database::open`] loads an optional JSON snapshot of the entity stores
//! and rebuilds every index from the chunks; [`Database::save`] writes one
//! atomically. Index internals are never persisted.

mod config;
mod database;
mod error;
mod filter;
mod lock;
mod registry;
mod repo;
mod service;
mod snapshot;

pub use config::{DatabaseBuilder, DatabaseConfig};
pub use database::Database;
pub use error::{Error, ErrorKind, Result};
pub use filter::SearchFilter;
pub use lock::{LibraryLock, LockRegistry};
pub use registry::{IndexHandle, IndexRegistry};
pub use service::{
    ChunkDraft, ChunkPatch, ChunkService, ChunkUpsert, DocumentService, LibraryService,
    SearchHit, SearchService,
};

pub use quiver_core::{
    Chunk, ChunkId, Document, DocumentId, IndexConfig, Library, LibraryId, Metadata,
};
pub use quiver_index::{ScoredHit, VectorIndex};

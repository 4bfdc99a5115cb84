//! Vector index strategies for the Quiver vector database.
//!
//! Three interchangeable strategies implement the common [`VectorIndex`]
//! contract over L2-normalized vectors and cosine similarity:
//!
//! - [`FlatIndex`]: exact brute force; the correctness oracle.
//! - [`LshIndex`]: random-hyperplane signatures with exact reranking.
//! - [`IvfIndex`]: inverted file over spherical k-means centroids.
//!
//! Results are ordered by descending cosine score with ties broken by
//! ascending chunk id, so identical inputs and seeds always produce
//! identical output.

mod build;
pub mod distance;
mod error;
mod flat;
mod ivf;
mod lsh;
mod rerank;
mod traits;

pub use build::build_index;
pub use error::IndexError;
pub use flat::FlatIndex;
pub use ivf::{IvfIndex, DRIFT_THRESHOLD, KMEANS_MAX_ITERS};
pub use lsh::{LshIndex, MIN_CANDIDATES, OVERSAMPLE_FACTOR};
pub use rerank::top_k;
pub use traits::{ChunkFilter, ScoredHit, VectorIndex};

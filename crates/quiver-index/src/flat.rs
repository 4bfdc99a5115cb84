//! Exact brute-force index.

use std::collections::HashMap;

use quiver_core::ChunkId;

use crate::distance::{checked_unit, unit_cosine};
use crate::error::IndexError;
use crate::rerank::top_k;
use crate::traits::{ChunkFilter, ScoredHit, VectorIndex};

/// Exact nearest-neighbor index over a flat vector table.
///
/// Search is a linear scan with a bounded min-heap: O(n * d) per query,
/// O(d) per mutation. This is the correctness oracle the approximate
/// strategies are validated against.
#[derive(Debug)]
pub struct FlatIndex {
    dim: usize,
    vectors: HashMap<ChunkId, Vec<f32>>,
}

impl FlatIndex {
    /// Create an empty index for vectors of dimension `dim`.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim, vectors: HashMap::new() }
    }
}

impl VectorIndex for FlatIndex {
    fn add(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        let unit = checked_unit(vector, self.dim)?;
        if self.vectors.contains_key(&chunk_id) {
            return Err(IndexError::DuplicateChunk(chunk_id));
        }
        self.vectors.insert(chunk_id, unit);
        Ok(())
    }

    fn update(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        if !self.vectors.contains_key(&chunk_id) {
            return Err(IndexError::ChunkNotFound(chunk_id));
        }
        let unit = checked_unit(vector, self.dim)?;
        self.vectors.insert(chunk_id, unit);
        Ok(())
    }

    fn remove(&mut self, chunk_id: ChunkId) -> bool {
        self.vectors.remove(&chunk_id).is_some()
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&ChunkFilter<'_>>,
    ) -> Result<Vec<ScoredHit>, IndexError> {
        let unit_query = checked_unit(query, self.dim)?;
        let scored = self
            .vectors
            .iter()
            .filter(|(id, _)| filter.map_or(true, |pred| pred(**id)))
            .map(|(id, vec)| (*id, unit_cosine(&unit_query, vec)));
        Ok(top_k(scored, k))
    }

    fn rebuild(&mut self, items: Vec<(ChunkId, Vec<f32>)>) -> Result<(), IndexError> {
        self.vectors.clear();
        for (chunk_id, vector) in items {
            self.add(chunk_id, &vector)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ChunkId {
        ChunkId::new(raw)
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut index = FlatIndex::new(2);
        index.add(id(1), &[1.0, 0.0]).expect("first add");
        assert_eq!(index.add(id(1), &[0.0, 1.0]), Err(IndexError::DuplicateChunk(id(1))));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn add_validates_dimension_and_zero() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(
            index.add(id(1), &[1.0, 0.0]),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert_eq!(index.add(id(1), &[0.0, 0.0, 0.0]), Err(IndexError::ZeroVector));
        assert!(index.is_empty());
    }

    #[test]
    fn update_requires_presence() {
        let mut index = FlatIndex::new(2);
        assert_eq!(index.update(id(1), &[1.0, 0.0]), Err(IndexError::ChunkNotFound(id(1))));

        index.add(id(1), &[1.0, 0.0]).expect("add");
        index.update(id(1), &[0.0, 1.0]).expect("update");

        let hits = index.search(&[0.0, 1.0], 1, None).expect("search");
        assert_eq!(hits[0].chunk_id, id(1));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut index = FlatIndex::new(2);
        index.add(id(1), &[1.0, 0.0]).expect("add");
        assert!(index.remove(id(1)));
        assert!(!index.remove(id(1)));
        assert!(index.is_empty());
    }

    #[test]
    fn search_matches_hand_computed_ground_truth() {
        let mut index = FlatIndex::new(3);
        index.add(id(1), &[1.0, 0.0, 0.0]).expect("add a");
        index.add(id(2), &[0.9, 0.1, 0.0]).expect("add b");
        index.add(id(3), &[0.0, 1.0, 0.0]).expect("add c");

        let hits = index.search(&[1.0, 0.0, 0.0], 2, None).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, id(1));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].chunk_id, id(2));
        // cos = 0.9 / sqrt(0.81 + 0.01) ~= 0.99388
        assert!((hits[1].score - 0.993_88).abs() < 1e-4);
    }

    #[test]
    fn search_validates_query() {
        let index = FlatIndex::new(3);
        assert!(index.search(&[0.0, 0.0, 0.0], 5, None).is_err());
        assert!(index.search(&[1.0], 5, None).is_err());
    }

    #[test]
    fn empty_index_returns_empty() {
        let index = FlatIndex::new(2);
        assert!(index.search(&[1.0, 0.0], 10, None).expect("search").is_empty());
    }

    #[test]
    fn filter_applies_before_selection() {
        let mut index = FlatIndex::new(2);
        index.add(id(1), &[1.0, 0.0]).expect("add");
        index.add(id(2), &[0.9, 0.1]).expect("add");
        index.add(id(3), &[0.0, 1.0]).expect("add");

        let keep_odd = |chunk: ChunkId| chunk.as_u64() % 2 == 1;
        let hits = index.search(&[1.0, 0.0], 2, Some(&keep_odd)).expect("search");
        let ids: Vec<u64> = hits.iter().map(|h| h.chunk_id.as_u64()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn add_then_remove_restores_membership() {
        let mut index = FlatIndex::new(2);
        index.add(id(1), &[1.0, 0.0]).expect("add");
        let before = index.len();

        index.add(id(2), &[0.5, 0.5]).expect("add");
        index.remove(id(2));

        assert_eq!(index.len(), before);
        let hits = index.search(&[0.5, 0.5], 10, None).expect("search");
        assert!(hits.iter().all(|h| h.chunk_id != id(2)));
    }

    #[test]
    fn rebuild_replaces_contents() {
        let mut index = FlatIndex::new(2);
        index.add(id(1), &[1.0, 0.0]).expect("add");

        index
            .rebuild(vec![(id(2), vec![0.0, 1.0]), (id(3), vec![1.0, 1.0])])
            .expect("rebuild");

        assert_eq!(index.len(), 2);
        let hits = index.search(&[0.0, 1.0], 10, None).expect("search");
        assert!(hits.iter().all(|h| h.chunk_id != id(1)));
    }
}

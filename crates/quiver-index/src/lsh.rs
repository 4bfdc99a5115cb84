//! Random-hyperplane locality-sensitive hashing index.
//!
//! Each of the `L` tables hashes a vector into an `H`-bit signature: bit `i`
//! is the sign of the dot product with the table's `i`-th random unit-length
//! hyperplane normal. Vectors sharing a signature land in the same bucket;
//! search unions the query's buckets across tables and exact-reranks the
//! candidates by cosine.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quiver_core::ChunkId;

use crate::distance::{checked_unit, normalize, unit_cosine};
use crate::error::IndexError;
use crate::rerank::top_k;
use crate::traits::{ChunkFilter, ScoredHit, VectorIndex};

/// Candidate oversampling factor: rerank up to `k * OVERSAMPLE_FACTOR`
/// candidates before selecting the top k.
pub const OVERSAMPLE_FACTOR: usize = 6;

/// Lower bound on the candidate floor regardless of `k`.
pub const MIN_CANDIDATES: usize = 32;

/// One hash table: hyperplane normals plus signature buckets.
#[derive(Debug)]
struct LshTable {
    hyperplanes: Vec<Vec<f32>>,
    buckets: HashMap<u64, HashSet<ChunkId>>,
}

impl LshTable {
    fn new(dim: usize, hyperplanes_per_table: usize, rng: &mut StdRng) -> Self {
        let hyperplanes =
            (0..hyperplanes_per_table).map(|_| random_unit_vector(dim, rng)).collect();
        Self { hyperplanes, buckets: HashMap::new() }
    }

    fn signature(&self, vector: &[f32]) -> u64 {
        let mut signature = 0u64;
        for (bit, hyperplane) in self.hyperplanes.iter().enumerate() {
            let dot: f32 = vector.iter().zip(hyperplane.iter()).map(|(x, y)| x * y).sum();
            if dot >= 0.0 {
                signature |= 1 << bit;
            }
        }
        signature
    }

    fn insert(&mut self, chunk_id: ChunkId, signature: u64) {
        self.buckets.entry(signature).or_default().insert(chunk_id);
    }

    fn remove(&mut self, chunk_id: ChunkId, signature: u64) {
        if let Some(bucket) = self.buckets.get_mut(&signature) {
            bucket.remove(&chunk_id);
            if bucket.is_empty() {
                self.buckets.remove(&signature);
            }
        }
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

fn random_unit_vector(dim: usize, rng: &mut StdRng) -> Vec<f32> {
    loop {
        let candidate: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        if let Some(unit) = normalize(&candidate) {
            return unit;
        }
    }
}

/// Random-hyperplane LSH index with exact reranking.
///
/// State per table is `{signature -> chunk ids}`; a global
/// `{chunk id -> (unit vector, per-table signatures)}` map makes removal
/// O(L). Hyperplanes are sampled once at construction from a seeded RNG, so
/// identical seeds reproduce identical search results.
#[derive(Debug)]
pub struct LshIndex {
    dim: usize,
    hyperplanes_per_table: usize,
    tables: Vec<LshTable>,
    entries: HashMap<ChunkId, (Vec<f32>, Vec<u64>)>,
}

impl LshIndex {
    /// Create an empty index.
    ///
    /// `num_tables` and `hyperplanes_per_table` are clamped to at least 1;
    /// `hyperplanes_per_table` is capped at 64 so signatures pack into a
    /// `u64`.
    #[must_use]
    pub fn new(dim: usize, num_tables: usize, hyperplanes_per_table: usize, seed: u64) -> Self {
        let num_tables = num_tables.max(1);
        let hyperplanes_per_table = hyperplanes_per_table.clamp(1, 64);
        let mut rng = StdRng::seed_from_u64(seed);
        let tables =
            (0..num_tables).map(|_| LshTable::new(dim, hyperplanes_per_table, &mut rng)).collect();
        Self { dim, hyperplanes_per_table, tables, entries: HashMap::new() }
    }

    fn signatures(&self, vector: &[f32]) -> Vec<u64> {
        self.tables.iter().map(|table| table.signature(vector)).collect()
    }

    fn insert_entry(&mut self, chunk_id: ChunkId, unit: Vec<f32>) {
        let signatures = self.signatures(&unit);
        for (table, signature) in self.tables.iter_mut().zip(signatures.iter()) {
            table.insert(chunk_id, *signature);
        }
        self.entries.insert(chunk_id, (unit, signatures));
    }

    fn remove_entry(&mut self, chunk_id: ChunkId) -> bool {
        match self.entries.remove(&chunk_id) {
            Some((_, signatures)) => {
                for (table, signature) in self.tables.iter_mut().zip(signatures.iter()) {
                    table.remove(chunk_id, *signature);
                }
                true
            }
            None => false,
        }
    }

    /// Gather candidates for `query_signatures`, expanding into the
    /// Hamming-1 neighborhood when the exact buckets fall short of `floor`.
    fn candidates(&self, query_signatures: &[u64], k: usize, floor: usize) -> HashSet<ChunkId> {
        let mut candidates = HashSet::new();
        for (table, signature) in self.tables.iter().zip(query_signatures.iter()) {
            if let Some(bucket) = table.buckets.get(signature) {
                candidates.extend(bucket.iter().copied());
            }
        }

        if candidates.len() >= floor {
            return candidates;
        }

        'expand: for (table, signature) in self.tables.iter().zip(query_signatures.iter()) {
            for bit in 0..self.hyperplanes_per_table {
                let neighbor = signature ^ (1 << bit);
                if let Some(bucket) = table.buckets.get(&neighbor) {
                    candidates.extend(bucket.iter().copied());
                }
                if candidates.len() >= floor {
                    break 'expand;
                }
            }
        }

        // Once every Hamming-1 neighborhood is exhausted and the pool still
        // cannot fill k results, degrade to a full scan so small indexes
        // stay exact.
        if candidates.len() < k {
            candidates.extend(self.entries.keys().copied());
        }

        candidates
    }
}

impl VectorIndex for LshIndex {
    fn add(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        let unit = checked_unit(vector, self.dim)?;
        if self.entries.contains_key(&chunk_id) {
            return Err(IndexError::DuplicateChunk(chunk_id));
        }
        self.insert_entry(chunk_id, unit);
        Ok(())
    }

    fn update(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        if !self.entries.contains_key(&chunk_id) {
            return Err(IndexError::ChunkNotFound(chunk_id));
        }
        let unit = checked_unit(vector, self.dim)?;
        self.remove_entry(chunk_id);
        self.insert_entry(chunk_id, unit);
        Ok(())
    }

    fn remove(&mut self, chunk_id: ChunkId) -> bool {
        self.remove_entry(chunk_id)
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&ChunkFilter<'_>>,
    ) -> Result<Vec<ScoredHit>, IndexError> {
        let unit_query = checked_unit(query, self.dim)?;
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let floor = k.saturating_mul(OVERSAMPLE_FACTOR).max(MIN_CANDIDATES);
        let query_signatures = self.signatures(&unit_query);
        let candidates = self.candidates(&query_signatures, k, floor);

        let scored = candidates
            .into_iter()
            .filter(|id| filter.map_or(true, |pred| pred(*id)))
            .filter_map(|id| {
                self.entries.get(&id).map(|(vec, _)| (id, unit_cosine(&unit_query, vec)))
            });
        Ok(top_k(scored, k))
    }

    fn rebuild(&mut self, items: Vec<(ChunkId, Vec<f32>)>) -> Result<(), IndexError> {
        self.entries.clear();
        for table in &mut self.tables {
            table.clear();
        }
        for (chunk_id, vector) in items {
            self.add(chunk_id, &vector)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

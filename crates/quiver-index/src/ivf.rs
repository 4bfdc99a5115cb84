//! Inverted-file index over spherical k-means centroids.
//!
//! Vectors are bucketed by their nearest centroid; search scores every
//! centroid against the query, probes the top `nprobe` posting lists, and
//! exact-reranks the union by cosine. Training runs spherical k-means with
//! k-means++ seeding over the current contents, either on `rebuild` or when
//! enough vectors have arrived since the last training.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quiver_core::ChunkId;

use crate::distance::{checked_unit, dot_product, normalize, unit_cosine};
use crate::error::IndexError;
use crate::rerank::top_k;
use crate::traits::{ChunkFilter, ScoredHit, VectorIndex};

/// Iteration cap for k-means training.
pub const KMEANS_MAX_ITERS: usize = 20;

/// Fraction of the trained set size that post-training inserts may reach
/// before the index retrains itself.
pub const DRIFT_THRESHOLD: f32 = 0.5;

/// Inverted-file index with k-means centroids and exact reranking.
///
/// State: the centroid matrix, per-centroid posting sets, and a global
/// `{chunk id -> unit vector}` map plus `{chunk id -> centroid}` assignment.
/// All training is driven by the seeded RNG, and training input is ordered
/// by chunk id, so fixed seeds reproduce identical centroids and results.
#[derive(Debug)]
pub struct IvfIndex {
    dim: usize,
    num_centroids: usize,
    nprobe: usize,
    rng: StdRng,
    centroids: Vec<Vec<f32>>,
    postings: HashMap<usize, HashSet<ChunkId>>,
    vectors: HashMap<ChunkId, Vec<f32>>,
    assignments: HashMap<ChunkId, usize>,
    trained_size: usize,
    inserts_since_train: usize,
}

impl IvfIndex {
    /// Create an empty, untrained index.
    ///
    /// `num_centroids` and `nprobe` are clamped to at least 1.
    #[must_use]
    pub fn new(dim: usize, num_centroids: usize, nprobe: usize, seed: u64) -> Self {
        Self {
            dim,
            num_centroids: num_centroids.max(1),
            nprobe: nprobe.max(1),
            rng: StdRng::seed_from_u64(seed),
            centroids: Vec::new(),
            postings: HashMap::new(),
            vectors: HashMap::new(),
            assignments: HashMap::new(),
            trained_size: 0,
            inserts_since_train: 0,
        }
    }

    /// Whether the index has trained centroids.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        nearest(vector, &self.centroids)
    }

    fn assign(&mut self, chunk_id: ChunkId, vector: &[f32]) {
        if self.centroids.is_empty() {
            return;
        }
        let centroid = self.nearest_centroid(vector);
        self.assignments.insert(chunk_id, centroid);
        self.postings.entry(centroid).or_default().insert(chunk_id);
    }

    fn unassign(&mut self, chunk_id: ChunkId) {
        if let Some(centroid) = self.assignments.remove(&chunk_id) {
            if let Some(posting) = self.postings.get_mut(&centroid) {
                posting.remove(&chunk_id);
                if posting.is_empty() {
                    self.postings.remove(&centroid);
                }
            }
        }
    }

    fn train_due(&self) -> bool {
        if self.vectors.is_empty() {
            return false;
        }
        if self.centroids.is_empty() {
            return self.vectors.len() >= self.num_centroids;
        }
        self.inserts_since_train as f32 > DRIFT_THRESHOLD * self.trained_size as f32
    }

    fn maybe_train(&mut self) {
        if self.train_due() {
            self.train();
        }
    }

    /// Run spherical k-means over the current contents and reassign every
    /// vector to its nearest centroid.
    fn train(&mut self) {
        // Deterministic training input: vectors ordered by chunk id.
        let mut items: Vec<(ChunkId, Vec<f32>)> =
            self.vectors.iter().map(|(id, v)| (*id, v.clone())).collect();
        items.sort_unstable_by_key(|(id, _)| *id);

        self.centroids.clear();
        self.postings.clear();
        self.assignments.clear();
        self.trained_size = items.len();
        self.inserts_since_train = 0;

        if items.is_empty() {
            return;
        }

        let k = self.num_centroids.min(items.len());
        let mut centroids = self.seed_centroids(&items, k);

        let mut assignment: Vec<usize> =
            items.iter().map(|(_, v)| nearest(v, &centroids)).collect();

        for _ in 0..KMEANS_MAX_ITERS {
            recompute_centroids(&items, &assignment, &mut centroids);
            let next: Vec<usize> = items.iter().map(|(_, v)| nearest(v, &centroids)).collect();
            if next == assignment {
                break;
            }
            assignment = next;
        }

        self.centroids = centroids;
        for ((chunk_id, _), centroid) in items.iter().zip(assignment.iter()) {
            self.assignments.insert(*chunk_id, *centroid);
            self.postings.entry(*centroid).or_default().insert(*chunk_id);
        }
    }

    /// k-means++ seeding: the first centroid is uniform, each further one is
    /// drawn with probability proportional to its angular distance from the
    /// nearest already-chosen centroid.
    fn seed_centroids(&mut self, items: &[(ChunkId, Vec<f32>)], k: usize) -> Vec<Vec<f32>> {
        let n = items.len();
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
        let first = self.rng.gen_range(0..n);
        centroids.push(items[first].1.clone());

        while centroids.len() < k {
            let weights: Vec<f32> = items
                .iter()
                .map(|(_, v)| {
                    let best =
                        centroids.iter().map(|c| dot_product(v, c)).fold(f32::MIN, f32::max);
                    (1.0 - best).max(0.0)
                })
                .collect();
            let total: f32 = weights.iter().sum();

            let pick = if total <= f32::EPSILON {
                self.rng.gen_range(0..n)
            } else {
                let mut target = self.rng.gen_range(0.0..total);
                let mut chosen = n - 1;
                for (i, weight) in weights.iter().enumerate() {
                    if target < *weight {
                        chosen = i;
                        break;
                    }
                    target -= weight;
                }
                chosen
            };
            centroids.push(items[pick].1.clone());
        }
        centroids
    }

    fn probe_candidates(&self, unit_query: &[f32]) -> HashSet<ChunkId> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, dot_product(unit_query, c)))
            .collect();
        ranked.sort_unstable_by(|(ai, a), (bi, b)| {
            b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal).then_with(|| ai.cmp(bi))
        });

        let mut candidates = HashSet::new();
        for (centroid, _) in ranked.into_iter().take(self.nprobe) {
            if let Some(posting) = self.postings.get(&centroid) {
                candidates.extend(posting.iter().copied());
            }
        }
        candidates
    }

    fn probe_or_scan(&self, unit_query: &[f32], k: usize) -> HashSet<ChunkId> {
        let candidates = self.probe_candidates(unit_query);
        if candidates.len() >= k {
            return candidates;
        }
        // The probed lists cannot fill k results; degrade to a full scan so
        // small result sets stay exact.
        self.vectors.keys().copied().collect()
    }
}

fn nearest(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_score = f32::MIN;
    for (i, centroid) in centroids.iter().enumerate() {
        let score = dot_product(vector, centroid);
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

/// Recompute each centroid as the normalized mean of its members. An empty
/// centroid is re-seeded from the farthest member of the most populous
/// cluster; a degenerate (zero) mean keeps the previous centroid.
fn recompute_centroids(
    items: &[(ChunkId, Vec<f32>)],
    assignment: &[usize],
    centroids: &mut [Vec<f32>],
) {
    let dim = items[0].1.len();
    let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for ((_, vector), centroid) in items.iter().zip(assignment.iter()) {
        counts[*centroid] += 1;
        for (sum, x) in sums[*centroid].iter_mut().zip(vector.iter()) {
            *sum += x;
        }
    }

    for c in 0..centroids.len() {
        if counts[c] == 0 {
            let crowded = counts
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.cmp(b))
                .map_or(0, |(i, _)| i);
            let farthest = items
                .iter()
                .zip(assignment.iter())
                .filter(|(_, assigned)| **assigned == crowded)
                .min_by(|((_, a), _), ((_, b), _)| {
                    let da = dot_product(a, &centroids[crowded]);
                    let db = dot_product(b, &centroids[crowded]);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|((_, vector), _)| vector.clone());
            if let Some(vector) = farthest {
                centroids[c] = vector;
            }
        } else if let Some(unit) = normalize(&sums[c]) {
            centroids[c] = unit;
        }
    }
}

impl VectorIndex for IvfIndex {
    fn add(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        let unit = checked_unit(vector, self.dim)?;
        if self.vectors.contains_key(&chunk_id) {
            return Err(IndexError::DuplicateChunk(chunk_id));
        }
        self.vectors.insert(chunk_id, unit.clone());
        self.assign(chunk_id, &unit);
        self.inserts_since_train += 1;
        self.maybe_train();
        Ok(())
    }

    fn update(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        if !self.vectors.contains_key(&chunk_id) {
            return Err(IndexError::ChunkNotFound(chunk_id));
        }
        let unit = checked_unit(vector, self.dim)?;
        self.unassign(chunk_id);
        self.vectors.insert(chunk_id, unit.clone());
        self.assign(chunk_id, &unit);
        self.inserts_since_train += 1;
        self.maybe_train();
        Ok(())
    }

    fn remove(&mut self, chunk_id: ChunkId) -> bool {
        self.unassign(chunk_id);
        self.vectors.remove(&chunk_id).is_some()
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&ChunkFilter<'_>>,
    ) -> Result<Vec<ScoredHit>, IndexError> {
        let unit_query = checked_unit(query, self.dim)?;
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let scored: Vec<(ChunkId, f32)> = if self.centroids.is_empty() {
            // Untrained: exact scan over everything.
            self.vectors
                .iter()
                .filter(|(id, _)| filter.map_or(true, |pred| pred(**id)))
                .map(|(id, vec)| (*id, unit_cosine(&unit_query, vec)))
                .collect()
        } else {
            self.probe_or_scan(&unit_query, k)
                .into_iter()
                .filter(|id| filter.map_or(true, |pred| pred(*id)))
                .filter_map(|id| {
                    self.vectors.get(&id).map(|vec| (id, unit_cosine(&unit_query, vec)))
                })
                .collect()
        };
        Ok(top_k(scored, k))
    }

    fn rebuild(&mut self, items: Vec<(ChunkId, Vec<f32>)>) -> Result<(), IndexError> {
        self.vectors.clear();
        self.centroids.clear();
        self.postings.clear();
        self.assignments.clear();
        self.trained_size = 0;
        self.inserts_since_train = 0;

        for (chunk_id, vector) in items {
            let unit = checked_unit(&vector, self.dim)?;
            if self.vectors.insert(chunk_id, unit).is_some() {
                return Err(IndexError::DuplicateChunk(chunk_id));
            }
        }
        self.train();
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

    /// 2n vectors clustered tightly around two opposite poles.
    fn two_pole_items(per_pole: u64) -> Vec<(ChunkId, Vec<f32>)> {
        let mut items = Vec::new();
        for i in 0..per_pole {
            let jitter = (i as f32).sin() * 0.05;
            items.push((id(i + 1), vec![1.0, jitter, 0.0]));
            items.push((id(per_pole + i + 1), vec![-1.0, 0.0, jitter]));
        }
        items
    }

    #[test]
    fn untrained_index_scans_exactly() {
        let mut index = IvfIndex::new(3, 16, 2, 1);
        index.add(id(1), &[1.0, 0.0, 0.0]).expect("add");
        index.add(id(2), &[0.9, 0.1, 0.0]).expect("add");
        index.add(id(3), &[0.0, 1.0, 0.0]).expect("add");
        assert!(!index.is_trained());

        let hits = index.search(&[1.0, 0.0, 0.0], 2, None).expect("search");
        assert_eq!(hits[0].chunk_id, id(1));
        assert_eq!(hits[1].chunk_id, id(2));
    }

    #[test]
    fn rebuild_trains_and_probes_one_pole() {
        let mut index = IvfIndex::new(3, 2, 1, 5);
        index.rebuild(two_pole_items(50)).expect("rebuild");
        assert!(index.is_trained());

        let hits = index.search(&[1.0, 0.0, 0.0], 10, None).expect("search");
        assert_eq!(hits.len(), 10);
        // nprobe=1 probes only the pole the query sits on.
        assert!(hits.iter().all(|h| h.chunk_id.as_u64() <= 50));
    }

    #[test]
    fn incremental_add_assigns_to_nearest_centroid() {
        let mut index = IvfIndex::new(3, 2, 1, 5);
        index.rebuild(two_pole_items(20)).expect("rebuild");

        index.add(id(500), &[0.95, 0.05, 0.0]).expect("add");
        let hits = index.search(&[1.0, 0.0, 0.0], 41, None).expect("search");
        assert!(hits.iter().any(|h| h.chunk_id == id(500)));
    }

    #[test]
    fn drift_triggers_retrain() {
        let mut index = IvfIndex::new(3, 2, 2, 9);
        index.rebuild(two_pole_items(4)).expect("rebuild");
        assert_eq!(index.trained_size, 8);

        // More than DRIFT_THRESHOLD * 8 = 4 inserts forces a retrain.
        for i in 0..5u64 {
            let jitter = (i as f32).cos() * 0.04;
            index.add(id(900 + i), &[jitter, 1.0, 0.0]).expect("add");
        }
        assert_eq!(index.inserts_since_train, 0);
        assert_eq!(index.trained_size, 13);
    }

    #[test]
    fn untrained_index_trains_once_full_enough() {
        let mut index = IvfIndex::new(2, 4, 2, 3);
        for i in 0..3u64 {
            index.add(id(i + 1), &[1.0, i as f32 * 0.1]).expect("add");
        }
        assert!(!index.is_trained());

        index.add(id(4), &[0.0, 1.0]).expect("add");
        assert!(index.is_trained());
    }

    #[test]
    fn remove_clears_postings() {
        let mut index = IvfIndex::new(3, 2, 2, 5);
        index.rebuild(two_pole_items(10)).expect("rebuild");

        assert!(index.remove(id(1)));
        assert!(!index.remove(id(1)));
        assert!(index.assignments.get(&id(1)).is_none());

        let hits = index.search(&[1.0, 0.0, 0.0], 50, None).expect("search");
        assert!(hits.iter().all(|h| h.chunk_id != id(1)));
    }

    #[test]
    fn update_moves_vector_between_clusters() {
        let mut index = IvfIndex::new(3, 2, 1, 5);
        index.rebuild(two_pole_items(20)).expect("rebuild");

        // Move a positive-pole vector to the negative pole.
        index.update(id(1), &[-1.0, 0.02, 0.0]).expect("update");
        let hits = index.search(&[-1.0, 0.0, 0.0], 41, None).expect("search");
        assert!(hits.iter().any(|h| h.chunk_id == id(1)));
    }

    #[test]
    fn deterministic_under_fixed_seed() {
        let build = || {
            let mut index = IvfIndex::new(3, 4, 2, 77);
            index.rebuild(two_pole_items(30)).expect("rebuild");
            index.search(&[0.7, 0.7, 0.1], 8, None).expect("search")
        };
        let first = build();
        let second = build();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
            assert_eq!(a.score, b.score);
        }
    }

    #[test]
    fn fewer_points_than_centroids_reduces_k() {
        let mut index = IvfIndex::new(2, 8, 4, 2);
        index
            .rebuild(vec![(id(1), vec![1.0, 0.0]), (id(2), vec![0.0, 1.0])])
            .expect("rebuild");
        assert_eq!(index.centroids.len(), 2);

        let hits = index.search(&[1.0, 0.1], 2, None).expect("search");
        assert_eq!(hits[0].chunk_id, id(1));
    }

    #[test]
    fn rebuild_matches_flat_for_full_k() {
        use crate::flat::FlatIndex;

        let items = two_pole_items(15);
        let mut ivf = IvfIndex::new(3, 4, 4, 13);
        ivf.rebuild(items.clone()).expect("rebuild ivf");
        let mut flat = FlatIndex::new(3);
        flat.rebuild(items.clone()).expect("rebuild flat");

        let query = [0.4, 0.9, 0.2];
        let ivf_hits = ivf.search(&query, items.len(), None).expect("ivf search");
        let flat_hits = flat.search(&query, items.len(), None).expect("flat search");

        let ivf_ids: std::collections::BTreeSet<u64> =
            ivf_hits.iter().map(|h| h.chunk_id.as_u64()).collect();
        let flat_ids: std::collections::BTreeSet<u64> =
            flat_hits.iter().map(|h| h.chunk_id.as_u64()).collect();
        assert_eq!(ivf_ids, flat_ids);
    }

    #[test]
    fn filter_applies_before_selection() {
        let mut index = IvfIndex::new(3, 2, 2, 5);
        index.rebuild(two_pole_items(10)).expect("rebuild");

        let only_even = |chunk: ChunkId| chunk.as_u64() % 2 == 0;
        let hits = index.search(&[1.0, 0.0, 0.0], 5, Some(&only_even)).expect("search");
        assert!(hits.iter().all(|h| h.chunk_id.as_u64() % 2 == 0));
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn zero_query_rejected() {
        let index = IvfIndex::new(3, 2, 1, 0);
        assert_eq!(index.search(&[0.0; 3], 4, None), Err(IndexError::ZeroVector));
    }
}

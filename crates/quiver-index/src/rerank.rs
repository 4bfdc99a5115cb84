//! Bounded top-k selection shared by the index strategies.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use quiver_core::ChunkId;

use crate::traits::ScoredHit;

/// Heap entry ordered so that the "greatest" entry is the best hit:
/// highest score first, lowest chunk id on ties.
#[derive(Debug, Clone, Copy)]
struct RankedHit {
    score: f32,
    chunk_id: ChunkId,
}

impl PartialEq for RankedHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedHit {}

impl PartialOrd for RankedHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedHit {
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN scores cannot arise from clamped cosine values; treat them as
        // equal to keep a total order.
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.chunk_id.cmp(&self.chunk_id))
    }
}

/// Select the top `k` of `scored` by descending score, ties broken by
/// ascending chunk id.
///
/// Maintains a bounded min-heap of size `k`, so memory stays O(k) over an
/// arbitrarily long candidate stream.
#[must_use]
pub fn top_k(scored: impl IntoIterator<Item = (ChunkId, f32)>, k: usize) -> Vec<ScoredHit> {
    if k == 0 {
        return Vec::new();
    }

    // saturating_add keeps k = usize::MAX from overflowing the capacity hint.
    let mut heap: BinaryHeap<Reverse<RankedHit>> =
        BinaryHeap::with_capacity(k.saturating_add(1).min(1024));
    for (chunk_id, score) in scored {
        heap.push(Reverse(RankedHit { score, chunk_id }));
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut hits: Vec<RankedHit> = heap.into_iter().map(|Reverse(hit)| hit).collect();
    hits.sort_unstable_by(|a, b| b.cmp(a));
    hits.into_iter().map(|hit| ScoredHit::new(hit.chunk_id, hit.score)).collect()
}

//! Index construction from a library's [`IndexConfig`].

use quiver_core::IndexConfig;

use crate::flat::FlatIndex;
use crate::ivf::IvfIndex;
use crate::lsh::LshIndex;
use crate::traits::VectorIndex;

/// Construct an empty index matching `config` for vectors of dimension
/// `dim`.
///
/// The `seed` drives all randomized state (LSH hyperplanes, IVF training),
/// so a fixed seed reproduces identical indexes across rebuilds. Flat
/// indexes ignore it.
#[must_use]
pub fn build_index(config: &IndexConfig, dim: usize, seed: u64) -> Box<dyn VectorIndex> {
    match *config {
        IndexConfig::Flat => Box::new(FlatIndex::new(dim)),
        IndexConfig::Lsh { num_tables, hyperplanes_per_table } => {
            Box::new(LshIndex::new(dim, num_tables, hyperplanes_per_table, seed))
        }
        IndexConfig::Ivf { num_centroids, nprobe } => {
            Box::new(IvfIndex::new(dim, num_centroids, nprobe, seed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::ChunkId;

    #[test]
    fn builds_each_strategy() {
        let flat = build_index(&IndexConfig::Flat, 4, 0);
        assert_eq!(flat.dim(), 4);
        assert!(flat.is_empty());

        let lsh = build_index(&IndexConfig::lsh_default(), 8, 1);
        assert_eq!(lsh.dim(), 8);

        let ivf = build_index(&IndexConfig::ivf_default(), 16, 2);
        assert_eq!(ivf.dim(), 16);
    }

    #[test]
    fn built_index_is_usable_through_the_trait() {
        let mut index = build_index(&IndexConfig::lsh_default(), 2, 3);
        index.add(ChunkId::new(1), &[1.0, 0.0]).expect("add");
        let hits = index.search(&[1.0, 0.0], 1, None).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, ChunkId::new(1));
    }
}

use std::path::{Path, PathBuf};

use rand::{Rng, RngCore};

use node_index::{base::write_ids_to_path, NodeId};

/// Draws `count` identifiers in `[min, max)`, repeats included
pub fn random_ids(count: usize, min: NodeId, max: NodeId, rng: &mut dyn RngCore) -> Vec<NodeId> {
    (0..count).map(|_| rng.gen_range(min..max)).collect()
}

/// Writes `ids` as unsorted chunk files of at most `chunk_size` identifiers
///
/// Files are named like the ones produced by the chunked buffers
pub fn write_chunks(dir: &Path, feature: &str, ids: &[NodeId], chunk_size: usize) -> Vec<PathBuf> {
    ids.chunks(chunk_size.max(1))
        .enumerate()
        .map(|(ix, chunk)| {
            let path = dir.join(format!("{}.part{:04}.u64", feature, ix));
            write_ids_to_path(&path, chunk).expect("cannot write chunk");
            path
        })
        .collect()
}

/// Sorted unique copy of `ids`
pub fn unique_sorted(ids: &[NodeId]) -> Vec<NodeId> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

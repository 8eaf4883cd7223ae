use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use log::info;
use rand::{rngs::StdRng, SeedableRng};
use temp_dir::TempDir;

use crate::ids::random_ids;
use node_index::{
    builder::{BuildManifest, BuilderOptions, ChunkedIdBuffer, IndexBuilder, IndexFormat},
    NodeId,
};

/// An index directory built from known identifier sets
pub struct TestIndex {
    pub dir: TempDir,
    pub expected: BTreeMap<String, BTreeSet<NodeId>>,
    pub manifest: BuildManifest,
}

impl TestIndex {
    pub fn new(
        features: &[(&str, Vec<NodeId>)],
        format: IndexFormat,
        options: &BuilderOptions,
    ) -> Self {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let tmp = TempDir::new().expect("Could not create temporary directory");

        let mut chunk_paths = BTreeMap::new();
        let mut raw_counts = BTreeMap::new();
        let mut expected = BTreeMap::new();

        for (feature, ids) in features.iter() {
            let mut buffer = ChunkedIdBuffer::new(feature, tmp.path(), options.flush_threshold)
                .expect("Could not create buffer");
            for id in ids.iter() {
                buffer.add(*id).expect("Could not add identifier");
            }
            raw_counts.insert(feature.to_string(), buffer.total_count());
            chunk_paths.insert(
                feature.to_string(),
                buffer.chunk_paths().expect("Could not flush buffer"),
            );
            expected.insert(feature.to_string(), ids.iter().copied().collect());
        }

        let manifest = IndexBuilder::new(dir.path(), tmp.path(), format, options)
            .expect("Could not create builder")
            .build(&chunk_paths, &raw_counts)
            .expect("Error while building the index");
        info!("Test index built in {}", dir.path().display());

        Self {
            dir,
            expected,
            manifest,
        }
    }

    /// Random features with `id_count` draws each in `[0, max_id)`
    pub fn random(
        feature_count: usize,
        id_count: usize,
        max_id: NodeId,
        seed: Option<u64>,
        format: IndexFormat,
        options: &BuilderOptions,
    ) -> Self {
        let mut rng = if let Some(seed) = seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        };

        let names: Vec<String> = (0..feature_count).map(|ix| format!("f{}", ix)).collect();
        let features: Vec<(&str, Vec<NodeId>)> = names
            .iter()
            .map(|name| (name.as_str(), random_ids(id_count, 0, max_id, &mut rng)))
            .collect();
        Self::new(&features, format, options)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of `ids` in the expected set of `feature`
    pub fn expected_count(&self, feature: &str, ids: &[NodeId]) -> usize {
        let set = &self.expected[feature];
        ids.iter().filter(|id| set.contains(id)).count()
    }
}

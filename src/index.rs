//! Query surface shared by the sorted array and roaring indices

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    base::NodeId,
    error::{Error, Result},
};

pub mod bitmap;
pub mod sorted;

pub use self::bitmap::RoaringIndex;
pub use self::sorted::SortedU64Index;

/// Size information about a loaded feature
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FeatureStatistics {
    /// Number of identifiers in the set
    pub count: u64,

    /// Size of the index file
    pub size_bytes: u64,

    /// For roaring indices, whether the grouped 64-bit container is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_64bit: Option<bool>,
}

/// Membership tests and counts over named sets of identifiers
pub trait NodeIndex {
    /// File extension handled by this index
    fn extension(&self) -> &'static str;

    /// Names of the loaded features (sorted)
    fn available_features(&self) -> Vec<String>;

    /// Returns true if `id` belongs to the feature set
    fn contains(&self, feature: &str, id: NodeId) -> Result<bool>;

    /// Counts how many of `ids` belong to the feature set
    ///
    /// Repeated identifiers are counted each time
    fn count(&self, feature: &str, ids: &[NodeId]) -> Result<usize>;

    /// Number of identifiers in the feature set
    fn size(&self, feature: &str) -> Result<u64>;

    /// Per-feature statistics
    fn statistics(&self) -> BTreeMap<String, FeatureStatistics>;

    /// Counts `ids` against every loaded feature
    fn count_all(&self, ids: &[NodeId]) -> Result<BTreeMap<String, usize>> {
        self.available_features()
            .into_iter()
            .map(|feature| {
                let count = self.count(&feature, ids)?;
                Ok((feature, count))
            })
            .collect()
    }
}

/// Lists the `(feature, path)` pairs of files with a given extension
pub(crate) fn feature_files(dir: &Path, extension: &str) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, "read_dir", e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, "read_dir", e))?.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != extension) {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            files.push((stem.to_string_lossy().into_owned(), path));
        }
    }
    files.sort();
    Ok(files)
}

/// Feature name of a file (its stem) unless one is given
pub(crate) fn feature_name(path: &Path, feature_name: Option<&str>) -> String {
    match feature_name {
        Some(name) => name.to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Count disagreement between the two backends
#[derive(Debug, Clone, PartialEq)]
pub struct CountMismatch {
    pub feature: String,
    pub sorted_count: usize,
    pub roaring_count: usize,
}

/// Both index backends loaded from the same directory
pub struct IndexSet {
    pub sorted: Option<SortedU64Index>,
    pub roaring: Option<RoaringIndex>,
}

impl IndexSet {
    /// Loads every backend with at least one file in `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let sorted = SortedU64Index::load_dir(dir)?;
        let roaring = RoaringIndex::load_dir(dir)?;
        Ok(Self {
            sorted: (!sorted.available_features().is_empty()).then_some(sorted),
            roaring: (!roaring.available_features().is_empty()).then_some(roaring),
        })
    }

    /// The loaded backends
    pub fn backends(&self) -> Vec<&dyn NodeIndex> {
        let mut backends: Vec<&dyn NodeIndex> = Vec::new();
        if let Some(index) = &self.sorted {
            backends.push(index);
        }
        if let Some(index) = &self.roaring {
            backends.push(index);
        }
        backends
    }

    /// Compares the counts of the two backends on their common features
    ///
    /// Returns an empty list when only one backend is loaded
    pub fn cross_check(&self, ids: &[NodeId]) -> Result<Vec<CountMismatch>> {
        let (sorted, roaring) = match (&self.sorted, &self.roaring) {
            (Some(sorted), Some(roaring)) => (sorted, roaring),
            _ => return Ok(Vec::new()),
        };

        let roaring_features = roaring.available_features();
        let mut mismatches = Vec::new();
        for feature in sorted.available_features() {
            if !roaring_features.contains(&feature) {
                continue;
            }
            let sorted_count = sorted.count(&feature, ids)?;
            let roaring_count = roaring.count(&feature, ids)?;
            if sorted_count != roaring_count {
                mismatches.push(CountMismatch {
                    feature,
                    sorted_count,
                    roaring_count,
                });
            }
        }
        Ok(mismatches)
    }
}

//! Sorted u64 index, memory-mapped by default
//!
//! Each feature is a raw array of ascending little-endian u64 values;
//! lookups are binary searches directly on the file bytes.

use std::{collections::BTreeMap, path::Path};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use super::{feature_files, feature_name, FeatureStatistics, NodeIndex};
use crate::{
    base::{Len, NodeId, ID_SIZE, U64_EXTENSION},
    error::{Error, Result},
    utils::buffer::{open_buffer, Buffer},
};

/// An ascending array of identifiers backed by a buffer
pub struct SortedIds {
    buffer: Box<dyn Buffer>,
}

impl SortedIds {
    pub fn open(path: &Path, in_memory: bool) -> Result<Self> {
        let buffer = open_buffer(path, in_memory)?;
        let len = buffer.data().len();
        if len % ID_SIZE != 0 {
            return Err(Error::InvalidArrayLength {
                path: path.to_path_buf(),
                len: len as u64,
            });
        }
        Ok(Self { buffer })
    }

    #[inline]
    pub fn get(&self, ix: usize) -> NodeId {
        let start = ix * ID_SIZE;
        LittleEndian::read_u64(&self.buffer.data()[start..start + ID_SIZE])
    }

    /// Leftmost position in `[from, len)` whose value is >= `id`
    pub fn lower_bound(&self, id: NodeId, from: usize) -> usize {
        let mut low = from;
        let mut high = self.len();
        while low < high {
            let mid = low + (high - low) / 2;
            if self.get(mid) < id {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    pub fn contains(&self, id: NodeId) -> bool {
        let ix = self.lower_bound(id, 0);
        ix < self.len() && self.get(ix) == id
    }

    /// Counts the members of `ids`
    ///
    /// Queries are sorted first so that each search starts where the
    /// previous one ended
    pub fn count(&self, ids: &[NodeId]) -> usize {
        if self.is_empty() || ids.is_empty() {
            return 0;
        }

        let mut queries = ids.to_vec();
        queries.sort_unstable();

        let mut position = 0;
        let mut count = 0;
        for id in queries {
            position = self.lower_bound(id, position);
            if position >= self.len() {
                break;
            }
            if self.get(position) == id {
                count += 1;
            }
        }
        count
    }

    pub fn size_bytes(&self) -> u64 {
        self.buffer.data().len() as u64
    }
}

impl Len for SortedIds {
    fn len(&self) -> usize {
        self.buffer.data().len() / ID_SIZE
    }
}

/// Index over `.u64` files
pub struct SortedU64Index {
    features: BTreeMap<String, SortedIds>,
    in_memory: bool,
}

impl SortedU64Index {
    pub fn new(in_memory: bool) -> Self {
        Self {
            features: BTreeMap::new(),
            in_memory,
        }
    }

    /// Loads all `.u64` files from a directory (memory-mapped)
    pub fn load_dir(path: &Path) -> Result<Self> {
        Self::load_dir_with(path, false)
    }

    pub fn load_dir_with(path: &Path, in_memory: bool) -> Result<Self> {
        let mut index = Self::new(in_memory);
        for (feature, file_path) in feature_files(path, U64_EXTENSION)? {
            index.add_file(&file_path, Some(&feature))?;
        }
        Ok(index)
    }

    /// Loads a single file; the feature name defaults to the file stem
    pub fn load_file(path: &Path, feature_name: Option<&str>) -> Result<Self> {
        let mut index = Self::new(false);
        index.add_file(path, feature_name)?;
        Ok(index)
    }

    /// Adds (or replaces) a feature from a file
    pub fn add_file(&mut self, path: &Path, name: Option<&str>) -> Result<()> {
        let name = feature_name(path, name);
        let ids = SortedIds::open(path, self.in_memory)?;
        debug!("Loaded {} ({} identifiers)", name, ids.len());
        self.features.insert(name, ids);
        Ok(())
    }

    fn feature(&self, feature: &str) -> Result<&SortedIds> {
        self.features
            .get(feature)
            .ok_or_else(|| Error::unknown_feature(feature, self.features.keys()))
    }
}

impl NodeIndex for SortedU64Index {
    fn extension(&self) -> &'static str {
        U64_EXTENSION
    }

    fn available_features(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    fn contains(&self, feature: &str, id: NodeId) -> Result<bool> {
        Ok(self.feature(feature)?.contains(id))
    }

    fn count(&self, feature: &str, ids: &[NodeId]) -> Result<usize> {
        Ok(self.feature(feature)?.count(ids))
    }

    fn size(&self, feature: &str) -> Result<u64> {
        Ok(self.feature(feature)?.len() as u64)
    }

    fn statistics(&self) -> BTreeMap<String, FeatureStatistics> {
        self.features
            .iter()
            .map(|(name, ids)| {
                (
                    name.clone(),
                    FeatureStatistics {
                        count: ids.len() as u64,
                        size_bytes: ids.size_bytes(),
                        is_64bit: None,
                    },
                )
            })
            .collect()
    }
}

//! Roaring bitmap index
//!
//! Roaring bitmaps only address 32-bit values. When every identifier of a
//! set fits in 32 bits the file is a plain roaring serialization ("narrow"
//! mode). Otherwise identifiers are grouped by their upper 32 bits and the
//! file is a container:
//!
//! ```text
//! b"ROAR64\0\0"                  8 bytes
//! group count                    u32 LE
//! repeated for each group:
//!     high word                  u32 LE
//!     serialized bitmap length   u32 LE
//!     roaring serialization of the low words
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    io::Write,
    path::Path,
};

use roaring::RoaringBitmap;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::debug;

use super::{feature_files, feature_name, FeatureStatistics, NodeIndex};
use crate::{
    base::{NodeId, ROAR64_MAGIC, ROARING_EXTENSION},
    error::{Error, Result},
};

#[inline]
fn split_id(id: NodeId) -> (u32, u32) {
    ((id >> 32) as u32, id as u32)
}

/// A set of 64-bit identifiers stored in 32-bit roaring bitmaps
#[derive(Debug, Clone, PartialEq)]
pub enum Roaring64 {
    /// All identifiers fit in 32 bits
    Narrow(RoaringBitmap),
    /// Bitmaps of low words indexed by high word
    Extended(HashMap<u32, RoaringBitmap>),
}

impl Roaring64 {
    /// Builds the set, choosing the narrow mode whenever possible
    pub fn from_ids(ids: &[NodeId]) -> Self {
        let max_id = ids.iter().copied().max().unwrap_or(0);

        if max_id <= u32::MAX as NodeId {
            let mut bitmap = RoaringBitmap::new();
            bitmap.extend(ids.iter().map(|&id| id as u32));
            return Roaring64::Narrow(bitmap);
        }

        let mut groups: HashMap<u32, RoaringBitmap> = HashMap::new();
        for &id in ids {
            let (high, low) = split_id(id);
            groups.entry(high).or_default().insert(low);
        }
        Roaring64::Extended(groups)
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Roaring64::Extended(_))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        match self {
            Roaring64::Narrow(bitmap) => id <= u32::MAX as NodeId && bitmap.contains(id as u32),
            Roaring64::Extended(groups) => {
                let (high, low) = split_id(id);
                groups.get(&high).map_or(false, |bitmap| bitmap.contains(low))
            }
        }
    }

    /// Number of identifiers in the set
    pub fn len(&self) -> u64 {
        match self {
            Roaring64::Narrow(bitmap) => bitmap.len(),
            Roaring64::Extended(groups) => groups.values().map(|bitmap| bitmap.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the set (groups are written by increasing high word)
    pub fn serialize_into<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        match self {
            Roaring64::Narrow(bitmap) => bitmap.serialize_into(writer),
            Roaring64::Extended(groups) => {
                writer.write_all(ROAR64_MAGIC)?;
                writer.write_u32::<LittleEndian>(groups.len() as u32)?;

                let mut highs: Vec<u32> = groups.keys().copied().collect();
                highs.sort_unstable();

                let mut bytes = Vec::new();
                for high in highs {
                    bytes.clear();
                    groups[&high].serialize_into(&mut bytes)?;
                    let size = u32::try_from(bytes.len()).map_err(|_| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("bitmap of group {} is too large", high),
                        )
                    })?;

                    writer.write_u32::<LittleEndian>(high)?;
                    writer.write_u32::<LittleEndian>(size)?;
                    writer.write_all(&bytes)?;
                }
                Ok(())
            }
        }
    }

    /// Reads a set from its serialized form; `path` is only used in errors
    pub fn deserialize(data: &[u8], path: &Path) -> Result<Self> {
        if data.is_empty() {
            return Ok(Roaring64::Narrow(RoaringBitmap::new()));
        }

        if data.len() < ROAR64_MAGIC.len() || &data[..ROAR64_MAGIC.len()] != ROAR64_MAGIC {
            let bitmap = RoaringBitmap::deserialize_from(data).map_err(|e| Error::InvalidBitmap {
                path: path.to_path_buf(),
                source: e,
            })?;
            return Ok(Roaring64::Narrow(bitmap));
        }

        let mut rest = &data[ROAR64_MAGIC.len()..];
        if rest.len() < 4 {
            return Err(Error::malformed(path, "truncated group count"));
        }
        let group_count = LittleEndian::read_u32(rest);
        rest = &rest[4..];

        let mut groups = HashMap::new();
        for ix in 0..group_count {
            if rest.len() < 8 {
                return Err(Error::malformed(
                    path,
                    format!("truncated header for group {} of {}", ix, group_count),
                ));
            }
            let high = LittleEndian::read_u32(&rest[0..4]);
            let size = LittleEndian::read_u32(&rest[4..8]) as usize;
            rest = &rest[8..];

            if size > rest.len() {
                return Err(Error::malformed(
                    path,
                    format!(
                        "group {} declares {} bytes but only {} remain",
                        high,
                        size,
                        rest.len()
                    ),
                ));
            }
            let (bytes, tail) = rest.split_at(size);
            rest = tail;

            let bitmap = RoaringBitmap::deserialize_from(bytes).map_err(|e| {
                Error::malformed(path, format!("group {} cannot be decoded: {}", high, e))
            })?;
            if groups.insert(high, bitmap).is_some() {
                return Err(Error::malformed(path, format!("duplicate group {}", high)));
            }
        }

        if !rest.is_empty() {
            return Err(Error::malformed(
                path,
                format!("{} trailing bytes after the last group", rest.len()),
            ));
        }

        Ok(Roaring64::Extended(groups))
    }
}

struct LoadedBitmap {
    bitmap: Roaring64,
    size_bytes: u64,
}

/// Index over `.roar` files, decompressed in memory at load time
pub struct RoaringIndex {
    features: BTreeMap<String, LoadedBitmap>,
}

impl RoaringIndex {
    pub fn new() -> Self {
        Self {
            features: BTreeMap::new(),
        }
    }

    /// Loads all `.roar` files from a directory
    pub fn load_dir(path: &Path) -> Result<Self> {
        let mut index = Self::new();
        for (feature, file_path) in feature_files(path, ROARING_EXTENSION)? {
            index.add_file(&file_path, Some(&feature))?;
        }
        Ok(index)
    }

    /// Loads a single file; the feature name defaults to the file stem
    pub fn load_file(path: &Path, feature_name: Option<&str>) -> Result<Self> {
        let mut index = Self::new();
        index.add_file(path, feature_name)?;
        Ok(index)
    }

    /// Adds (or replaces) a feature from a file
    pub fn add_file(&mut self, path: &Path, name: Option<&str>) -> Result<()> {
        let name = feature_name(path, name);
        let data = std::fs::read(path).map_err(|e| Error::io(path, "read", e))?;
        let bitmap = Roaring64::deserialize(&data, path)?;
        debug!(
            "Loaded {} ({} identifiers, 64-bit: {})",
            name,
            bitmap.len(),
            bitmap.is_64bit()
        );
        self.features.insert(
            name,
            LoadedBitmap {
                bitmap,
                size_bytes: data.len() as u64,
            },
        );
        Ok(())
    }

    /// The bitmap of a feature
    pub fn bitmap(&self, feature: &str) -> Result<&Roaring64> {
        self.features
            .get(feature)
            .map(|loaded| &loaded.bitmap)
            .ok_or_else(|| Error::unknown_feature(feature, self.features.keys()))
    }
}

impl Default for RoaringIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeIndex for RoaringIndex {
    fn extension(&self) -> &'static str {
        ROARING_EXTENSION
    }

    fn available_features(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    fn contains(&self, feature: &str, id: NodeId) -> Result<bool> {
        Ok(self.bitmap(feature)?.contains(id))
    }

    fn count(&self, feature: &str, ids: &[NodeId]) -> Result<usize> {
        let bitmap = self.bitmap(feature)?;
        Ok(ids.iter().filter(|&&id| bitmap.contains(id)).count())
    }

    fn size(&self, feature: &str) -> Result<u64> {
        Ok(self.bitmap(feature)?.len())
    }

    fn statistics(&self) -> BTreeMap<String, FeatureStatistics> {
        self.features
            .iter()
            .map(|(name, loaded)| {
                (
                    name.clone(),
                    FeatureStatistics {
                        count: loaded.bitmap.len(),
                        size_bytes: loaded.size_bytes,
                        is_64bit: Some(loaded.bitmap.is_64bit()),
                    },
                )
            })
            .collect()
    }
}

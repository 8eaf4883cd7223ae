//! Writers turning a canonical (sorted, unique) identifier sequence
//! into a persistent index file

use std::path::{Path, PathBuf};

use crate::{base::NodeId, builder::IndexFormat, error::Result};

pub mod bitmap;
pub mod sorted;

pub use self::bitmap::RoaringWriter;
pub use self::sorted::SortedU64Writer;

/// Trait for all index writers
pub trait IndexWriter: Send + Sync {
    /// File extension of the written index (without the dot)
    fn extension(&self) -> &'static str;

    /// Directory where index files are written
    fn output_dir(&self) -> &Path;

    /// Writes the sorted unique identifiers of a feature and returns the file path
    fn write(&self, feature_name: &str, ids: &[NodeId]) -> Result<PathBuf>;

    fn output_path(&self, feature_name: &str) -> PathBuf {
        self.output_dir()
            .join(format!("{}.{}", feature_name, self.extension()))
    }
}

/// Returns the writers needed for a given format
pub fn writers_for(format: IndexFormat, output_dir: &Path) -> Result<Vec<Box<dyn IndexWriter>>> {
    let mut writers: Vec<Box<dyn IndexWriter>> = Vec::new();
    if format.sorted_u64() {
        writers.push(Box::new(SortedU64Writer::new(output_dir)?));
    }
    if format.roaring() {
        writers.push(Box::new(RoaringWriter::new(output_dir)?));
    }
    Ok(writers)
}

pub(crate) fn create_output_dir(output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| crate::error::Error::io(output_dir, "create", e))?;
    Ok(output_dir.to_path_buf())
}

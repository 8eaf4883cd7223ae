use std::path::{Path, PathBuf};

use super::{create_output_dir, IndexWriter};
use crate::{
    base::{write_ids_to_path, NodeId, U64_EXTENSION},
    error::Result,
};

/// Writes identifiers as a raw array of little-endian u64 values
///
/// The files have no header and can be memory-mapped directly; an empty
/// set gives an empty file.
pub struct SortedU64Writer {
    output_dir: PathBuf,
}

impl SortedU64Writer {
    pub fn new(output_dir: &Path) -> Result<Self> {
        Ok(Self {
            output_dir: create_output_dir(output_dir)?,
        })
    }
}

impl IndexWriter for SortedU64Writer {
    fn extension(&self) -> &'static str {
        U64_EXTENSION
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write(&self, feature_name: &str, ids: &[NodeId]) -> Result<PathBuf> {
        let path = self.output_path(feature_name);
        write_ids_to_path(&path, ids)?;
        Ok(path)
    }
}

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;

use super::{create_output_dir, IndexWriter};
use crate::{
    base::{NodeId, ROARING_EXTENSION},
    error::{Error, Result},
    index::bitmap::Roaring64,
};

/// Writes identifiers as a roaring bitmap
///
/// Sets whose identifiers all fit in 32 bits are written as a plain roaring
/// bitmap; other sets use the grouped `ROAR64` container.
pub struct RoaringWriter {
    output_dir: PathBuf,
}

impl RoaringWriter {
    pub fn new(output_dir: &Path) -> Result<Self> {
        Ok(Self {
            output_dir: create_output_dir(output_dir)?,
        })
    }
}

impl IndexWriter for RoaringWriter {
    fn extension(&self) -> &'static str {
        ROARING_EXTENSION
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write(&self, feature_name: &str, ids: &[NodeId]) -> Result<PathBuf> {
        let path = self.output_path(feature_name);
        let bitmap = Roaring64::from_ids(ids);
        debug!(
            "Writing {} identifiers to {} (64-bit: {})",
            ids.len(),
            path.display(),
            bitmap.is_64bit()
        );

        let file = File::create(&path).map_err(|e| Error::io(&path, "create", e))?;
        let mut writer = BufWriter::new(file);
        bitmap
            .serialize_into(&mut writer)
            .map_err(|e| Error::io(&path, "write", e))?;
        writer.flush().map_err(|e| Error::io(&path, "write", e))?;
        Ok(path)
    }
}

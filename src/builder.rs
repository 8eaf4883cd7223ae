use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
};

use derivative::Derivative;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    base::{read_ids, remove_file_if_exists, write_ids_to_path, NodeId, MANIFEST_CBOR},
    error::{Error, Result},
    sort::sort_and_unique_chunks,
    writers::{writers_for, IndexWriter},
};

/*
* ---- Options
*
*/

#[derive(Derivative, Clone, Debug, Serialize, Deserialize, PartialEq)]
#[derivative(Default)]
pub struct BuilderOptions {
    /// Number of identifiers a feature buffer holds before it is
    /// written to a chunk file
    #[derivative(Default(value = "100_000"))]
    pub flush_threshold: usize,

    /// Above this total number of identifiers, chunks are sorted
    /// one by one and merged (10M identifiers = 80MB)
    #[derivative(Default(value = "10_000_000"))]
    pub external_sort_threshold: u64,

    /// Number of identifiers read at once from each sorted file
    /// during the merge
    #[derivative(Default(value = "1_000_000"))]
    pub read_batch: usize,

    /// Number of merged identifiers buffered before being written
    #[derivative(Default(value = "100_000"))]
    pub write_batch: usize,
}

/// Index file format(s) produced by a build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexFormat {
    SortedU64,
    Roaring,
    Both,
}

impl IndexFormat {
    pub fn sorted_u64(&self) -> bool {
        matches!(self, IndexFormat::SortedU64 | IndexFormat::Both)
    }

    pub fn roaring(&self) -> bool {
        matches!(self, IndexFormat::Roaring | IndexFormat::Both)
    }
}

impl FromStr for IndexFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "u64" => Ok(IndexFormat::SortedU64),
            "roar" => Ok(IndexFormat::Roaring),
            "both" => Ok(IndexFormat::Both),
            _ => Err(format!("unknown format '{}' (expected u64, roar or both)", s)),
        }
    }
}

impl std::fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexFormat::SortedU64 => "u64",
            IndexFormat::Roaring => "roar",
            IndexFormat::Both => "both",
        };
        write!(f, "{}", s)
    }
}

/*
* ---- First phase data structure
*
*/

/// Accumulates the identifiers of one feature and spills them
/// to numbered chunk files
pub struct ChunkedIdBuffer {
    feature_name: String,
    tmp_dir: PathBuf,
    flush_threshold: usize,
    buffer: Vec<NodeId>,
    chunk_count: usize,
    total_count: u64,
}

impl ChunkedIdBuffer {
    pub fn new(feature_name: &str, tmp_dir: &Path, flush_threshold: usize) -> Result<Self> {
        std::fs::create_dir_all(tmp_dir).map_err(|e| Error::io(tmp_dir, "create", e))?;
        let flush_threshold = flush_threshold.max(1);
        Ok(Self {
            feature_name: feature_name.to_string(),
            tmp_dir: tmp_dir.to_path_buf(),
            flush_threshold,
            buffer: Vec::with_capacity(flush_threshold),
            chunk_count: 0,
            total_count: 0,
        })
    }

    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    /// Number of identifiers added so far (duplicates included)
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Number of chunk files written so far
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    fn chunk_path(&self, ix: usize) -> PathBuf {
        self.tmp_dir
            .join(format!("{}.part{:04}.u64", self.feature_name, ix))
    }

    /// Adds an identifier, flushing when the threshold is reached
    pub fn add(&mut self, id: NodeId) -> Result<()> {
        self.buffer.push(id);
        self.total_count += 1;

        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the buffered identifiers (as is) to a new chunk file
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let path = self.chunk_path(self.chunk_count);
        debug!(
            "Flush {} ({} identifiers) to {}",
            self.feature_name,
            self.buffer.len(),
            path.display()
        );
        write_ids_to_path(&path, &self.buffer)?;

        self.buffer.clear();
        self.chunk_count += 1;
        Ok(())
    }

    /// Flushes the remaining identifiers and returns all the chunk files
    pub fn chunk_paths(&mut self) -> Result<Vec<PathBuf>> {
        self.flush()?;
        Ok((0..self.chunk_count).map(|ix| self.chunk_path(ix)).collect())
    }

    /// Sorts and deduplicates all the chunks into `output`
    ///
    /// Returns the number of unique identifiers. The chunks are consumed:
    /// identifiers added afterwards start a new set of chunks.
    pub fn finalize(&mut self, output: &Path, options: &BuilderOptions) -> Result<usize> {
        let chunk_paths = self.chunk_paths()?;
        self.chunk_count = 0;
        sort_and_unique_chunks(&chunk_paths, output, &self.tmp_dir, options, true)
    }
}

/*
* ---- Second phase: writing the indices
*
*/

/// Summary of one feature in a build
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FeatureSummary {
    /// Number of identifiers seen during the scan (with duplicates)
    pub raw_count: u64,
    /// Number of distinct identifiers
    pub unique_count: u64,
    /// Names of the index files written
    pub files: Vec<String>,
}

/// Information stored next to the index files
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BuildManifest {
    pub format: IndexFormat,
    pub options: BuilderOptions,
    pub features: BTreeMap<String, FeatureSummary>,
}

const DEFAULT_PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(DEFAULT_PROGRESS_TEMPLATE)
        .progress_chars("=> ")
}

/// Turns the chunk files of each feature into index files
pub struct IndexBuilder {
    out_dir: PathBuf,
    tmp_dir: PathBuf,
    format: IndexFormat,
    options: BuilderOptions,
    writers: Vec<Box<dyn IndexWriter>>,
    show_progress: bool,
}

impl IndexBuilder {
    pub fn new(
        out_dir: &Path,
        tmp_dir: &Path,
        format: IndexFormat,
        options: &BuilderOptions,
    ) -> Result<Self> {
        std::fs::create_dir_all(tmp_dir).map_err(|e| Error::io(tmp_dir, "create", e))?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            tmp_dir: tmp_dir.to_path_buf(),
            format,
            options: options.clone(),
            writers: writers_for(format, out_dir)?,
            show_progress: false,
        })
    }

    /// Displays a progress bar while building
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Builds the index files of one feature
    pub fn build_feature(
        &self,
        feature: &str,
        chunk_paths: &[PathBuf],
        raw_count: u64,
    ) -> Result<FeatureSummary> {
        let ids = if chunk_paths.is_empty() {
            Vec::new()
        } else {
            let sorted_path = self.tmp_dir.join(format!("{}_sorted.u64", feature));
            sort_and_unique_chunks(chunk_paths, &sorted_path, &self.tmp_dir, &self.options, true)?;
            let ids = read_ids(&sorted_path)?;
            remove_file_if_exists(&sorted_path)?;
            ids
        };

        let mut files = Vec::with_capacity(self.writers.len());
        for writer in self.writers.iter() {
            let path = writer.write(feature, &ids)?;
            if let Some(name) = path.file_name() {
                files.push(name.to_string_lossy().into_owned());
            }
        }

        info!("{}: {} unique identifiers ({} raw)", feature, ids.len(), raw_count);
        Ok(FeatureSummary {
            raw_count,
            unique_count: ids.len() as u64,
            files,
        })
    }

    /// Builds all the features and writes the manifest
    pub fn build(
        &self,
        chunk_paths: &BTreeMap<String, Vec<PathBuf>>,
        raw_counts: &BTreeMap<String, u64>,
    ) -> Result<BuildManifest> {
        let progress = if self.show_progress {
            ProgressBar::new(chunk_paths.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(pb_style());

        let mut features = BTreeMap::new();
        for (feature, chunks) in chunk_paths.iter() {
            progress.set_message(feature);
            let raw_count = raw_counts.get(feature).copied().unwrap_or(0);
            let summary = self.build_feature(feature, chunks, raw_count)?;
            features.insert(feature.clone(), summary);
            progress.inc(1);
        }
        progress.finish();

        let manifest = BuildManifest {
            format: self.format,
            options: self.options.clone(),
            features,
        };
        save_manifest(&manifest, &self.out_dir)?;
        Ok(manifest)
    }
}

pub fn save_manifest(manifest: &BuildManifest, dir: &Path) -> Result<()> {
    let path = dir.join(MANIFEST_CBOR);
    let file = File::create(&path).map_err(|e| Error::io(&path, "create", e))?;
    ciborium::ser::into_writer(manifest, file).map_err(|e| Error::Manifest(e.to_string()))
}

pub fn load_manifest(dir: &Path) -> Result<BuildManifest> {
    let path = dir.join(MANIFEST_CBOR);
    let file = File::open(&path).map_err(|e| Error::io(&path, "open", e))?;
    ciborium::de::from_reader(file).map_err(|e| Error::Manifest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = BuilderOptions::default();
        assert_eq!(options.flush_threshold, 100_000);
        assert_eq!(options.external_sort_threshold, 10_000_000);
        assert_eq!(options.read_batch, 1_000_000);
        assert_eq!(options.write_batch, 100_000);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("u64".parse::<IndexFormat>(), Ok(IndexFormat::SortedU64));
        assert_eq!("roar".parse::<IndexFormat>(), Ok(IndexFormat::Roaring));
        assert_eq!("both".parse::<IndexFormat>(), Ok(IndexFormat::Both));
        assert!("parquet".parse::<IndexFormat>().is_err());

        assert!(IndexFormat::Both.sorted_u64() && IndexFormat::Both.roaring());
        assert!(!IndexFormat::Roaring.sorted_u64());
        assert_eq!(IndexFormat::SortedU64.to_string(), "u64");
    }
}

//! Routes tagged records into per-feature chunked buffers
//!
//! Decoding the source dataset is left to the caller: the handler consumes
//! `(id, tags)` records, or a plain text stream with one record per line:
//!
//! ```text
//! # comment
//! 1234 highway=traffic_signals crossing=marked
//! 1235
//! ```

use std::{
    collections::BTreeMap,
    io::BufRead,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    base::NodeId,
    builder::ChunkedIdBuffer,
    error::{Error, Result},
    schema::{FeatureSpecs, Tags},
};

/// Counters gathered while scanning
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ScanStatistics {
    pub nodes_processed: u64,
    pub nodes_matched: u64,
    /// Number of (possibly repeated) identifiers per feature
    pub feature_counts: BTreeMap<String, u64>,
}

pub struct TaggingHandler {
    specs: FeatureSpecs,
    buffers: BTreeMap<String, ChunkedIdBuffer>,
    nodes_processed: u64,
    nodes_matched: u64,
}

impl TaggingHandler {
    pub fn new(specs: FeatureSpecs, tmp_dir: &Path, flush_threshold: usize) -> Result<Self> {
        let mut buffers = BTreeMap::new();
        for spec in specs.iter() {
            buffers.insert(
                spec.name.clone(),
                ChunkedIdBuffer::new(&spec.name, tmp_dir, flush_threshold)?,
            );
        }
        Ok(Self {
            specs,
            buffers,
            nodes_processed: 0,
            nodes_matched: 0,
        })
    }

    /// Processes one record
    pub fn node(&mut self, id: NodeId, tags: &Tags) -> Result<()> {
        self.nodes_processed += 1;

        // Most records are untagged geometry points
        if tags.is_empty() {
            return Ok(());
        }

        let mut matched = false;
        for spec in self.specs.iter() {
            if spec.matches(tags) {
                if let Some(buffer) = self.buffers.get_mut(&spec.name) {
                    buffer.add(id)?;
                    matched = true;
                }
            }
        }

        if matched {
            self.nodes_matched += 1;
        }
        Ok(())
    }

    /// Processes a text stream of records
    pub fn scan<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for (ix, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::io("<input>", "read", e))?;
            if let Some((id, tags)) = parse_record(&line, ix + 1)? {
                self.node(id, &tags)?;
            }
        }
        info!(
            "Processed {} nodes, matched {}",
            self.nodes_processed, self.nodes_matched
        );
        Ok(())
    }

    pub fn statistics(&self) -> ScanStatistics {
        ScanStatistics {
            nodes_processed: self.nodes_processed,
            nodes_matched: self.nodes_matched,
            feature_counts: self
                .buffers
                .iter()
                .map(|(name, buffer)| (name.clone(), buffer.total_count()))
                .collect(),
        }
    }

    /// Flushes every buffer and returns the chunk files of each feature
    pub fn chunk_paths(&mut self) -> Result<BTreeMap<String, Vec<PathBuf>>> {
        let mut paths = BTreeMap::new();
        for (name, buffer) in self.buffers.iter_mut() {
            let chunks = buffer.chunk_paths()?;
            debug!("{}: {} chunks", name, chunks.len());
            paths.insert(name.clone(), chunks);
        }
        Ok(paths)
    }
}

/// Parses a `<id> key=value ...` line; blank and `#` lines give `None`
pub fn parse_record(line: &str, line_number: usize) -> Result<Option<(NodeId, Tags)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let id_token = tokens.next().unwrap_or_default();
    let id: NodeId = id_token.parse().map_err(|_| Error::InvalidRecord {
        line: line_number,
        detail: format!("'{}' is not a node ID", id_token),
    })?;

    let mut tags = Tags::new();
    for token in tokens {
        let (key, value) = token.split_once('=').ok_or_else(|| Error::InvalidRecord {
            line: line_number,
            detail: format!("tag '{}' is not of the form key=value", token),
        })?;
        tags.insert(key.to_string(), value.to_string());
    }
    Ok(Some((id, tags)))
}

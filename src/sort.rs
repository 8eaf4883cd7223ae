//! Sorting and merging of identifier chunks
//!
//! Chunks produced by the buffers are unsorted and may contain duplicates.
//! Small inputs are sorted in memory; larger ones are sorted chunk by chunk
//! and then merged with a k-way merge so that at most one chunk is held in
//! memory at a time.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    base::{
        id_count, read_ids, remove_file_if_exists, write_ids, write_ids_to_path, IdBatchReader,
        NodeId,
    },
    builder::BuilderOptions,
    error::{Error, Result},
};

/// Sorts and removes duplicates in place
fn sort_unique(ids: &mut Vec<NodeId>) {
    ids.sort_unstable();
    ids.dedup();
}

fn remove_all(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        remove_file_if_exists(path)?;
    }
    Ok(())
}

/// Cursor over a sorted identifier file
struct SortedCursor {
    reader: IdBatchReader,
    batch: Vec<NodeId>,
    position: usize,
}

impl SortedCursor {
    fn open(path: &Path, batch_size: usize) -> Result<Self> {
        Ok(Self {
            reader: IdBatchReader::open(path, batch_size)?,
            batch: Vec::new(),
            position: 0,
        })
    }

    fn next(&mut self) -> Result<Option<NodeId>> {
        if self.position >= self.batch.len() {
            self.position = 0;
            if !self.reader.next_batch(&mut self.batch)? {
                return Ok(None);
            }
        }
        let value = self.batch[self.position];
        self.position += 1;
        Ok(Some(value))
    }
}

/// Merges sorted identifier files into one, removing duplicates
///
/// Each input must be sorted in ascending order. Returns the number of
/// unique identifiers written to `output`.
pub fn merge_sorted_files(
    inputs: &[PathBuf],
    output: &Path,
    options: &BuilderOptions,
    remove_inputs: bool,
) -> Result<usize> {
    if inputs.is_empty() {
        write_ids_to_path(output, &[])?;
        return Ok(0);
    }

    if inputs.len() == 1 {
        let mut ids = read_ids(&inputs[0])?;
        sort_unique(&mut ids);
        write_ids_to_path(output, &ids)?;
        if remove_inputs {
            remove_all(inputs)?;
        }
        return Ok(ids.len());
    }

    debug!("Merging {} sorted files into {}", inputs.len(), output.display());

    let mut cursors = inputs
        .iter()
        .map(|path| SortedCursor::open(path, options.read_batch))
        .collect::<Result<Vec<_>>>()?;

    // Min-heap on (value, source index)
    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for (source, cursor) in cursors.iter_mut().enumerate() {
        if let Some(value) = cursor.next()? {
            heap.push(Reverse((value, source)));
        }
    }

    let file = File::create(output).map_err(|e| Error::io(output, "create", e))?;
    let mut writer = BufWriter::new(file);
    let write_batch = options.write_batch.max(1);
    let mut pending: Vec<NodeId> = Vec::with_capacity(write_batch);
    let mut last: Option<NodeId> = None;
    let mut count = 0;

    while let Some(Reverse((value, source))) = heap.pop() {
        if last != Some(value) {
            pending.push(value);
            last = Some(value);
            count += 1;

            if pending.len() >= write_batch {
                write_ids(&mut writer, &pending).map_err(|e| Error::io(output, "write", e))?;
                pending.clear();
            }
        }

        if let Some(next) = cursors[source].next()? {
            heap.push(Reverse((next, source)));
        }
    }

    write_ids(&mut writer, &pending).map_err(|e| Error::io(output, "write", e))?;
    writer.flush().map_err(|e| Error::io(output, "write", e))?;

    // Close the inputs before removing them
    drop(cursors);
    if remove_inputs {
        remove_all(inputs)?;
    }

    Ok(count)
}

/// Sorts and deduplicates identifiers from unsorted chunk files
///
/// Returns the number of unique identifiers written to `output`. Chunk files
/// are deleted once consumed when `remove_chunks` is set. Intermediate sorted
/// chunks are written in `tmp_dir`.
pub fn sort_and_unique_chunks(
    chunk_paths: &[PathBuf],
    output: &Path,
    tmp_dir: &Path,
    options: &BuilderOptions,
    remove_chunks: bool,
) -> Result<usize> {
    if chunk_paths.is_empty() {
        write_ids_to_path(output, &[])?;
        return Ok(0);
    }

    let mut total: u64 = 0;
    for path in chunk_paths {
        total += id_count(path)?;
    }

    if chunk_paths.len() == 1 || total <= options.external_sort_threshold {
        debug!(
            "In-memory sort of {} identifiers ({} chunks)",
            total,
            chunk_paths.len()
        );
        let mut ids = Vec::with_capacity(total as usize);
        for path in chunk_paths {
            ids.extend(read_ids(path)?);
        }
        sort_unique(&mut ids);
        write_ids_to_path(output, &ids)?;

        if remove_chunks {
            remove_all(chunk_paths)?;
        }
        return Ok(ids.len());
    }

    info!(
        "External sort of {} identifiers ({} chunks)",
        total,
        chunk_paths.len()
    );

    let mut sorted_paths = Vec::with_capacity(chunk_paths.len());
    for (ix, chunk_path) in chunk_paths.iter().enumerate() {
        let mut ids = read_ids(chunk_path)?;
        sort_unique(&mut ids);

        let sorted_path = tmp_dir.join(format!("sorted_{:04}.u64", ix));
        write_ids_to_path(&sorted_path, &ids)?;
        sorted_paths.push(sorted_path);

        if remove_chunks {
            remove_file_if_exists(chunk_path)?;
        }
    }

    merge_sorted_files(&sorted_paths, output, options, true)
}

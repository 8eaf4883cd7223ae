use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};

/// A node identifier
pub type NodeId = u64;

/// Size (in bytes) of one identifier on disk
pub const ID_SIZE: usize = std::mem::size_of::<NodeId>();

/// Extension of sorted array index files
pub const U64_EXTENSION: &str = "u64";

/// Extension of roaring bitmap index files
pub const ROARING_EXTENSION: &str = "roar";

/// Build manifest stored alongside the index files
pub const MANIFEST_CBOR: &str = "manifest.cbor";

/// Leading bytes of an extended (64-bit) roaring container.
///
/// Native roaring serializations start with the little-endian cookie 12346 or
/// 12347, so the two never collide.
pub const ROAR64_MAGIC: &[u8; 8] = b"ROAR64\x00\x00";

/// Marks object that have a length
pub trait Len {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writes identifiers as raw little-endian u64 values
pub fn write_ids(writer: &mut dyn Write, ids: &[NodeId]) -> std::io::Result<()> {
    for &id in ids {
        writer.write_u64::<LittleEndian>(id)?;
    }
    Ok(())
}

/// Creates (or truncates) `path` and writes the identifiers into it
pub fn write_ids_to_path(path: &Path, ids: &[NodeId]) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, "create", e))?;
    let mut writer = BufWriter::new(file);
    write_ids(&mut writer, ids).map_err(|e| Error::io(path, "write", e))?;
    writer.flush().map_err(|e| Error::io(path, "write", e))?;
    Ok(())
}

/// Decodes a buffer of little-endian u64 values
pub fn decode_ids(bytes: &[u8], path: &Path) -> Result<Vec<NodeId>> {
    if bytes.len() % ID_SIZE != 0 {
        return Err(Error::InvalidArrayLength {
            path: path.to_path_buf(),
            len: bytes.len() as u64,
        });
    }
    let mut ids = vec![0; bytes.len() / ID_SIZE];
    LittleEndian::read_u64_into(bytes, &mut ids);
    Ok(ids)
}

/// Reads all the identifiers of a raw file
///
/// A missing or empty file gives an empty vector
pub fn read_ids(path: &Path) -> Result<Vec<NodeId>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, "read", e))?;
    decode_ids(&bytes, path)
}

/// Number of identifiers stored in a raw file (0 if missing)
pub fn id_count(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len() / ID_SIZE as u64),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(Error::io(path, "stat", e)),
    }
}

/// Removes a file, ignoring the case where it is already gone
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, "remove", e)),
    }
}

/// Streams a raw identifier file in batches
pub struct IdBatchReader {
    reader: BufReader<File>,
    path: PathBuf,
    batch_size: usize,
    bytes: Vec<u8>,
}

impl IdBatchReader {
    pub fn open(path: &Path, batch_size: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, "open", e))?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            batch_size: batch_size.max(1),
            bytes: Vec::new(),
        })
    }

    /// Reads the next batch into `ids` (cleared first), returns false at EOF
    pub fn next_batch(&mut self, ids: &mut Vec<NodeId>) -> Result<bool> {
        self.bytes.clear();
        let limit = (self.batch_size * ID_SIZE) as u64;
        (&mut self.reader)
            .take(limit)
            .read_to_end(&mut self.bytes)
            .map_err(|e| Error::io(&self.path, "read", e))?;

        ids.clear();
        if self.bytes.is_empty() {
            return Ok(false);
        }
        ids.extend(decode_ids(&self.bytes, &self.path)?);
        Ok(true)
    }
}

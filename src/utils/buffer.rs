use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Read-only view on the bytes of a file
pub trait Buffer: Send + Sync {
    fn data(&self) -> &[u8];
}

/// Stores the data in memory
pub struct MemoryBuffer {
    data: Vec<u8>,
}

impl MemoryBuffer {
    pub fn new(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::io(path, "open", e))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| Error::io(path, "read", e))?;

        Ok(Self { data })
    }

    pub fn empty() -> Self {
        Self { data: Vec::new() }
    }
}

impl Buffer for MemoryBuffer {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Uses a memory map
pub struct MmapBuffer {
    mmap: Mmap,
}

impl MmapBuffer {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, "open", e))?;
        // Index files are never modified once written
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::io(path, "mmap", e))?;
        Ok(Self { mmap })
    }
}

impl Buffer for MmapBuffer {
    fn data(&self) -> &[u8] {
        &self.mmap
    }
}

/// Opens a file either in memory or memory-mapped
///
/// Empty files are never mapped (mapping zero bytes fails on some platforms)
pub fn open_buffer(path: &Path, in_memory: bool) -> Result<Box<dyn Buffer>> {
    let len = std::fs::metadata(path)
        .map_err(|e| Error::io(path, "stat", e))?
        .len();

    if len == 0 {
        Ok(Box::new(MemoryBuffer::empty()))
    } else if in_memory {
        Ok(Box::new(MemoryBuffer::new(path)?))
    } else {
        Ok(Box::new(MmapBuffer::new(path)?))
    }
}

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{CResult, Error};
use crate::io::Driver;

/// Memory-mapped read-only view of a segment file. Remapped whenever the
/// underlying file grows past the mapped length (the active segment keeps
/// writing through an `AppendWriter` concurrently).
pub struct MmapReader {
    file: File,
    mmap: Option<Mmap>,
    mapped_len: u64,
}

impl MmapReader {
    pub fn open(path: &Path) -> CResult<Self> {
        let file = File::open(path)?;
        let mut reader = MmapReader { file, mmap: None, mapped_len: 0 };
        reader.remap()?;
        Ok(reader)
    }

    fn remap(&mut self) -> CResult<()> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            self.mmap = None;
            self.mapped_len = 0;
            return Ok(());
        }
        // Safety: the file is append-only within this process's lifetime and
        // is never truncated except on recovery (before any reader is live).
        let mmap = unsafe { Mmap::map(&self.file)? };
        self.mmap = Some(mmap);
        self.mapped_len = len;
        Ok(())
    }

    /// Re-maps if the file has grown since the last map.
    pub fn refresh(&mut self) -> CResult<()> {
        let len = self.file.metadata()?.len();
        if len != self.mapped_len {
            self.remap()?;
        }
        Ok(())
    }
}

impl Driver for MmapReader {
    fn read(&self, buf: &mut [u8], offset: u64) -> CResult<usize> {
        let mmap = match &self.mmap {
            Some(m) => m,
            None => return Err(Error::Internal("read from unmapped segment".to_string())),
        };
        let start = offset as usize;
        let end = (start + buf.len()).min(mmap.len());
        if start > mmap.len() {
            return Err(Error::CorruptRecord);
        }
        let n = end - start;
        buf[..n].copy_from_slice(&mmap[start..end]);
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> CResult<usize> {
        Err(Error::Internal("MmapReader is read-only".to_string()))
    }

    fn sync(&mut self) -> CResult<()> {
        Ok(())
    }

    fn size(&self) -> CResult<u64> {
        Ok(self.mapped_len)
    }
}

//! Data file & segment set: an ordered sequence of append-only `.cly` files,
//! exactly one of which is active (writable).
//!
//! Grounded on the teacher's `storage::log_cask::LogCask` (open/rename/compact
//! over a single file), generalized to a numbered sequence of segments per
//! spec.md §4.3/§3.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::codec::record::{decode_header, verify_crc, LogRecord, MAX_HEADER_LEN};
use crate::error::{CResult, Error};
use crate::io::{AppendWriter, Driver, MmapReader};

/// Uniquely identifies a record: which segment, and the byte offset within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPos {
    pub segment_id: u32,
    pub offset: i64,
}

pub const SEGMENT_SUFFIX: &str = "cly";

pub fn segment_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(format!("{:09}.{}", id, SEGMENT_SUFFIX))
}

/// Parses a `NNNNNNNNN.cly` file name into its segment id.
pub fn parse_segment_id(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(&format!(".{}", SEGMENT_SUFFIX))?;
    stem.parse::<u32>().ok()
}

/// One append-only data file: an id, a write offset, a writer driver, and a
/// reader driver (spec.md §4.3).
pub struct Segment {
    pub id: u32,
    writer: AppendWriter,
    reader: MmapReader,
}

impl Segment {
    pub fn open(dir: &Path, id: u32) -> CResult<Self> {
        let path = segment_path(dir, id);
        let writer = AppendWriter::open(&path)?;
        // the reader needs the file to exist first; AppendWriter::open creates it.
        let reader = MmapReader::open(&path)?;
        Ok(Segment { id, writer, reader })
    }

    /// Current logical write offset (bytes appended so far).
    pub fn write_offset(&self) -> CResult<u64> {
        self.writer.size()
    }

    /// Writes `bytes`, advancing the write offset. Returns the offset the
    /// write started at.
    pub fn append(&mut self, bytes: &[u8]) -> CResult<u64> {
        let start = self.writer.size()?;
        self.writer.write(bytes)?;
        Ok(start)
    }

    pub fn sync(&mut self) -> CResult<()> {
        self.writer.sync()
    }

    /// Reads and decodes the record at `offset`. `Ok(None)` signals end-of-file
    /// (a zeroed header); a CRC mismatch is `Err(Error::CorruptRecord)`.
    pub fn read_record(&mut self, offset: u64) -> CResult<Option<(LogRecord, usize)>> {
        self.reader.refresh()?;
        let remaining = self.reader.size()?.saturating_sub(offset);
        if remaining == 0 {
            return Ok(None);
        }
        let window_len = remaining.min(MAX_HEADER_LEN as u64) as usize;
        let mut window = vec![0u8; window_len];
        let n = self.reader.read(&mut window, offset)?;
        window.truncate(n);

        let (header, header_len) = match decode_header(&window)? {
            Some(h) => h,
            None => return Ok(None),
        };

        let total_len = header_len + header.key_len + header.value_len;
        let mut full = vec![0u8; total_len];
        if (total_len as u64) <= window_len as u64 && total_len <= window.len() {
            full.copy_from_slice(&window[..total_len]);
        } else {
            let n = self.reader.read(&mut full, offset)?;
            if n < total_len {
                return Err(Error::CorruptRecord);
            }
        }

        let key = full[header_len..header_len + header.key_len].to_vec();
        let value = full[header_len + header.key_len..total_len].to_vec();

        if !verify_crc(header.crc, &full[4..header_len], &key, &value) {
            return Err(Error::CorruptRecord);
        }

        let record = LogRecord {
            record_type: header.record_type,
            data_type: header.data_type,
            expiration_ns: header.expiration_ns,
            key,
            value,
        };
        Ok(Some((record, total_len)))
    }

    /// Truncates the backing file to `offset`, used by recovery when the tail
    /// record is corrupt/partial.
    pub fn truncate(&mut self, offset: u64) -> CResult<()> {
        self.writer.file().set_len(offset)?;
        self.writer.set_offset(offset);
        self.reader.refresh()?;
        Ok(())
    }
}

/// The full set of segments for a database directory: one active, the rest closed.
pub struct SegmentSet {
    dir: PathBuf,
    pub active: Segment,
    pub closed: BTreeMap<u32, Segment>,
    data_file_size: i64,
    bytes_since_sync: u64,
}

impl SegmentSet {
    /// Lists existing segment files, opens them all, and makes the
    /// highest-id one active. Creates segment 0 if the directory is empty.
    pub fn open(dir: &Path, data_file_size: i64) -> CResult<Self> {
        std::fs::create_dir_all(dir)?;

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = parse_segment_id(name) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();

        let mut closed = BTreeMap::new();
        let active_id = if let Some(&last) = ids.last() {
            for &id in &ids[..ids.len() - 1] {
                closed.insert(id, Segment::open(dir, id)?);
            }
            last
        } else {
            0
        };
        let active = Segment::open(dir, active_id)?;

        Ok(SegmentSet { dir: dir.to_path_buf(), active, closed, data_file_size, bytes_since_sync: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends a pre-encoded record to the active segment, rolling over to a
    /// new segment first if it would exceed `data_file_size`. Returns the
    /// resulting log position.
    pub fn append(&mut self, bytes: &[u8]) -> CResult<LogPos> {
        let current = self.active.write_offset()? as i64;
        if current > 0 && current + bytes.len() as i64 > self.data_file_size {
            self.roll_over()?;
        }

        let segment_id = self.active.id;
        let offset = self.active.append(bytes)? as i64;
        Ok(LogPos { segment_id, offset })
    }

    /// Forces a rollover regardless of size, sealing the current active
    /// segment into `closed` even if empty. Used by merge to establish a
    /// clean boundary between what gets compacted and what stays live.
    pub fn force_roll_over(&mut self) -> CResult<()> {
        self.roll_over()
    }

    fn roll_over(&mut self) -> CResult<()> {
        self.active.sync()?;
        let next_id = self.active.id + 1;
        let sealed = Segment::open(&self.dir, self.active.id)?;
        let new_active = Segment::open(&self.dir, next_id)?;
        let old_active = std::mem::replace(&mut self.active, new_active);
        drop(old_active);
        self.closed.insert(sealed.id, sealed);
        log::info!("rolled over to segment {}", next_id);
        Ok(())
    }

    /// Reads the record at `pos`, whichever segment it lives in.
    pub fn read_at(&mut self, pos: LogPos) -> CResult<LogRecord> {
        let segment = if pos.segment_id == self.active.id {
            &mut self.active
        } else {
            self.closed.get_mut(&pos.segment_id).ok_or(Error::NotFound)?
        };
        match segment.read_record(pos.offset as u64)? {
            Some((record, _)) => Ok(record),
            None => Err(Error::NotFound),
        }
    }

    /// Applies the configured sync policy after an append of `written` bytes.
    pub fn maybe_sync(&mut self, written: u64, sync_on_write: bool, bytes_per_sync: u64) -> CResult<()> {
        if sync_on_write {
            self.active.sync()?;
            self.bytes_since_sync = 0;
            return Ok(());
        }
        if bytes_per_sync > 0 {
            self.bytes_since_sync += written;
            if self.bytes_since_sync >= bytes_per_sync {
                self.active.sync()?;
                self.bytes_since_sync = 0;
            }
        }
        Ok(())
    }

    pub fn sync_all(&mut self) -> CResult<()> {
        self.active.sync()?;
        for segment in self.closed.values_mut() {
            segment.sync()?;
        }
        Ok(())
    }

    /// All segment ids in ascending order, active last.
    pub fn ordered_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.closed.keys().copied().collect();
        ids.push(self.active.id);
        ids
    }

    /// Drops in-memory handles for closed segments below `boundary` and
    /// (re)opens whatever segment files exist below it on disk. Used right
    /// after merge swaps freshly-compacted segments into the live directory
    /// in place of the ones it just deleted (spec.md §4.10 step 7).
    pub fn reload_below(&mut self, boundary: u32) -> CResult<()> {
        self.closed.retain(|&id, _| id >= boundary);
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = parse_segment_id(name) {
                    if id < boundary && id != self.active.id && !self.closed.contains_key(&id) {
                        self.closed.insert(id, Segment::open(&self.dir, id)?);
                    }
                }
            }
        }
        Ok(())
    }
}

use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use crate::error::CResult;

/// Which `meta::MemTable` implementation backs each index family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    BTree,
    AdaptiveRadixTree,
    HashMap,
}

impl Default for IndexType {
    fn default() -> Self {
        IndexType::BTree
    }
}

/// Database-open configuration, matching the recognised options table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// Directory in which segment files, the lock file, and merge output live.
    pub dir_path: PathBuf,

    /// Segment rollover threshold in bytes. Clamped to a 64-byte floor by `validate`.
    pub data_file_size: i64,

    /// Which memtable implementation backs every index family.
    pub index_type: IndexType,

    /// If true, every append is followed by an fsync.
    pub sync_on_write: bool,

    /// Accumulate this many written bytes before an implicit fsync. 0 disables.
    pub bytes_per_sync: u64,

    /// Seconds between automatic merges. Values below 60 disable the scheduler.
    pub merge_interval: i64,

    /// Carried through but not acted on by the core (out of scope here).
    pub enable_scripting: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dir_path: PathBuf::from("."),
            data_file_size: 256 * 1024 * 1024,
            index_type: IndexType::BTree,
            sync_on_write: false,
            bytes_per_sync: 0,
            merge_interval: 0,
            enable_scripting: false,
        }
    }
}

impl Options {
    /// Applies the minimum `data_file_size` floor. Called by `Database::open`.
    pub fn validate(&mut self) -> CResult<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(crate::error::Error::BadArgs);
        }
        if self.data_file_size < 64 {
            self.data_file_size = 64;
        }
        Ok(())
    }
}

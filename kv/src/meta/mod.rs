//! The memtable abstraction: a concurrent-safe, lexicographically-ordered
//! mapping from key bytes to a `LogPos`, with a seekable forward/reverse
//! iterator. Grounded on `examples/original_source/meta/memTable.go`'s
//! `MemTable`/`Iterator` interfaces.

pub mod art;
pub mod btree;
pub mod hashmap;

use crate::options::IndexType;
use crate::segment::LogPos;

pub trait MemTable: Send + Sync {
    /// Inserts or replaces the position for `key`. Returns `true` (matches the
    /// teacher's boolean-return convention; always succeeds barring a panic).
    fn put(&self, key: &[u8], pos: LogPos) -> bool;

    fn get(&self, key: &[u8]) -> Option<LogPos>;

    /// Removes `key`. Returns whether it was present.
    fn delete(&self, key: &[u8]) -> bool;

    fn count(&self) -> usize;

    /// A snapshot iterator. Snapshot freshness across concurrent mutation
    /// during traversal is not guaranteed (spec.md §4.4's documented limitation).
    fn iterator(&self, reverse: bool) -> Box<dyn MemTableIterator>;
}

pub trait MemTableIterator {
    fn rewind(&mut self);
    fn seek(&mut self, key: &[u8]);
    fn next(&mut self);
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> Option<LogPos>;
    fn close(&mut self);
}

pub fn new_memtable(index_type: IndexType) -> Box<dyn MemTable> {
    match index_type {
        IndexType::BTree => Box::new(btree::BTreeTable::new()),
        IndexType::AdaptiveRadixTree => Box::new(art::AdaptiveRadixTree::new()),
        IndexType::HashMap => Box::new(hashmap::ConcurrentHashTable::new()),
    }
}

/// Shared "materialize, binary-search, walk an index" iterator used by every
/// memtable implementation (grounded on the teacher's/original's
/// `btreeIterator`: it snapshots entries up front and seeks via
/// `sort.Search`). Entries are captured as `(key, position)` pairs rather
/// than keys alone so the returned `Box<dyn MemTableIterator>` owns its data
/// outright and never needs to borrow back into the table that produced it —
/// the trait's `Box<dyn MemTableIterator>` return type carries an implicit
/// `'static` bound, which a borrowing iterator couldn't satisfy.
pub(crate) struct MaterializedIterator {
    entries: Vec<(Vec<u8>, LogPos)>,
    reverse: bool,
    index: usize,
}

impl MaterializedIterator {
    pub(crate) fn new(mut entries: Vec<(Vec<u8>, LogPos)>, reverse: bool) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        if reverse {
            entries.reverse();
        }
        MaterializedIterator { entries, reverse, index: 0 }
    }

    pub(crate) fn rewind(&mut self) {
        self.index = 0;
    }

    pub(crate) fn seek(&mut self, key: &[u8]) {
        self.index = if self.reverse {
            self.entries.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.entries.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    pub(crate) fn next(&mut self) {
        self.index += 1;
    }

    pub(crate) fn valid(&self) -> bool {
        self.index < self.entries.len()
    }

    pub(crate) fn key(&self) -> &[u8] {
        &self.entries[self.index].0
    }

    pub(crate) fn value(&self) -> Option<LogPos> {
        self.entries.get(self.index).map(|(_, pos)| *pos)
    }

    pub(crate) fn close(&mut self) {
        self.entries.clear();
    }
}

use dashmap::DashMap;

use crate::meta::{MaterializedIterator, MemTable, MemTableIterator};
use crate::segment::LogPos;

/// `dashmap`-backed memtable. Spec.md §4.4 requires that the hash-map
/// implementation "must still materialise a sorted view when an iterator is
/// requested" since `DashMap` has no inherent ordering.
pub struct ConcurrentHashTable {
    inner: DashMap<Vec<u8>, LogPos>,
}

impl ConcurrentHashTable {
    pub fn new() -> Self {
        ConcurrentHashTable { inner: DashMap::new() }
    }
}

impl Default for ConcurrentHashTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable for ConcurrentHashTable {
    fn put(&self, key: &[u8], pos: LogPos) -> bool {
        self.inner.insert(key.to_vec(), pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<LogPos> {
        self.inner.get(key).map(|entry| *entry.value())
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.inner.remove(key).is_some()
    }

    fn count(&self) -> usize {
        self.inner.len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn MemTableIterator> {
        let entries: Vec<(Vec<u8>, LogPos)> = self.inner.iter().map(|e| (e.key().clone(), *e.value())).collect();
        Box::new(HashTableIterator { inner: MaterializedIterator::new(entries, reverse) })
    }
}

struct HashTableIterator {
    inner: MaterializedIterator,
}

impl MemTableIterator for HashTableIterator {
    fn rewind(&mut self) {
        self.inner.rewind();
    }

    fn seek(&mut self, key: &[u8]) {
        self.inner.seek(key);
    }

    fn next(&mut self) {
        self.inner.next();
    }

    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn key(&self) -> &[u8] {
        self.inner.key()
    }

    fn value(&self) -> Option<LogPos> {
        self.inner.value()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materializes_sorted_iteration() {
        let table = ConcurrentHashTable::new();
        for (k, off) in [("z", 1), ("a", 2), ("m", 3)] {
            table.put(k.as_bytes(), LogPos { segment_id: 0, offset: off });
        }
        let mut it = table.iterator(false);
        it.rewind();
        let mut keys = Vec::new();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"m".to_vec(), b"z".to_vec()]);
    }
}

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::meta::{MaterializedIterator, MemTable, MemTableIterator};
use crate::segment::LogPos;

/// `RwLock<BTreeMap<..>>`-backed memtable, mirroring the teacher's `KeyDir`
/// type alias (`BTreeMap<Vec<u8>, (u64, u32)>`) generalized to `LogPos`.
pub struct BTreeTable {
    inner: RwLock<BTreeMap<Vec<u8>, LogPos>>,
}

impl BTreeTable {
    pub fn new() -> Self {
        BTreeTable { inner: RwLock::new(BTreeMap::new()) }
    }
}

impl Default for BTreeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable for BTreeTable {
    fn put(&self, key: &[u8], pos: LogPos) -> bool {
        self.inner.write().unwrap().insert(key.to_vec(), pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<LogPos> {
        self.inner.read().unwrap().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.inner.write().unwrap().remove(key).is_some()
    }

    fn count(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn MemTableIterator> {
        let guard = self.inner.read().unwrap();
        let entries: Vec<(Vec<u8>, LogPos)> = guard.iter().map(|(k, v)| (k.clone(), *v)).collect();
        Box::new(BTreeTableIterator { inner: MaterializedIterator::new(entries, reverse) })
    }
}

struct BTreeTableIterator {
    inner: MaterializedIterator,
}

impl MemTableIterator for BTreeTableIterator {
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
    fn put_get_delete() {
        let table = BTreeTable::new();
        assert_eq!(table.get(b"a"), None);
        table.put(b"a", LogPos { segment_id: 0, offset: 10 });
        assert_eq!(table.get(b"a"), Some(LogPos { segment_id: 0, offset: 10 }));
        assert!(table.delete(b"a"));
        assert_eq!(table.get(b"a"), None);
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn iterator_is_sorted_and_seekable() {
        let table = BTreeTable::new();
        for (k, off) in [("b", 1), ("a", 2), ("c", 3)] {
            table.put(k.as_bytes(), LogPos { segment_id: 0, offset: off });
        }
        let mut it = table.iterator(false);
        it.rewind();
        let mut keys = Vec::new();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let mut it = table.iterator(false);
        it.seek(b"b");
        assert_eq!(it.key(), b"b");
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::meta::{MaterializedIterator, MemTable, MemTableIterator};
use crate::segment::LogPos;

/// A simplified adaptive radix tree: a byte-keyed trie without ART's
/// node4/16/48/256 size-class adaptation or path compression. No ART crate
/// was found anywhere in the retrieved pack, so this is hand-written rather
/// than faked as a dependency (see DESIGN.md). Children are kept in a
/// `BTreeMap<u8, _>` so traversal already yields keys in byte order, same as
/// the contract the other memtables provide via post-hoc sorting.
struct Node {
    children: BTreeMap<u8, Box<Node>>,
    value: Option<LogPos>,
}

impl Node {
    fn new() -> Self {
        Node { children: BTreeMap::new(), value: None }
    }
}

pub struct AdaptiveRadixTree {
    root: Mutex<Node>,
    count: AtomicUsize,
}

impl AdaptiveRadixTree {
    pub fn new() -> Self {
        AdaptiveRadixTree { root: Mutex::new(Node::new()), count: AtomicUsize::new(0) }
    }

    fn collect_entries(node: &Node, prefix: &mut Vec<u8>, out: &mut Vec<(Vec<u8>, LogPos)>) {
        if let Some(pos) = node.value {
            out.push((prefix.clone(), pos));
        }
        for (&byte, child) in &node.children {
            prefix.push(byte);
            Self::collect_entries(child, prefix, out);
            prefix.pop();
        }
    }
}

impl Default for AdaptiveRadixTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable for AdaptiveRadixTree {
    fn put(&self, key: &[u8], pos: LogPos) -> bool {
        let mut node = self.root.lock().unwrap();
        let mut cursor = &mut *node;
        for &byte in key {
            cursor = cursor.children.entry(byte).or_insert_with(|| Box::new(Node::new()));
        }
        if cursor.value.is_none() {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        cursor.value = Some(pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<LogPos> {
        let node = self.root.lock().unwrap();
        let mut cursor = &*node;
        for &byte in key {
            cursor = cursor.children.get(&byte)?;
        }
        cursor.value
    }

    fn delete(&self, key: &[u8]) -> bool {
        let mut node = self.root.lock().unwrap();
        let mut cursor = &mut *node;
        for &byte in key {
            match cursor.children.get_mut(&byte) {
                Some(child) => cursor = child,
                None => return false,
            }
        }
        let existed = cursor.value.take().is_some();
        if existed {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
        existed
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    fn iterator(&self, reverse: bool) -> Box<dyn MemTableIterator> {
        let node = self.root.lock().unwrap();
        let mut entries = Vec::new();
        let mut prefix = Vec::new();
        Self::collect_entries(&node, &mut prefix, &mut entries);
        Box::new(ArtIterator { inner: MaterializedIterator::new(entries, reverse) })
    }
}

struct ArtIterator {
    inner: MaterializedIterator,
}

impl MemTableIterator for ArtIterator {
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
    fn put_get_delete_and_ordering() {
        let tree = AdaptiveRadixTree::new();
        for (k, off) in [("bob", 1), ("anna", 2), ("bobby", 3), ("cara", 4)] {
            tree.put(k.as_bytes(), LogPos { segment_id: 0, offset: off });
        }
        assert_eq!(tree.count(), 4);
        assert_eq!(tree.get(b"bob"), Some(LogPos { segment_id: 0, offset: 1 }));
        assert!(tree.delete(b"bob"));
        assert_eq!(tree.get(b"bob"), None);
        assert_eq!(tree.get(b"bobby"), Some(LogPos { segment_id: 0, offset: 3 }));

        let mut it = tree.iterator(false);
        it.rewind();
        let mut keys = Vec::new();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"anna".to_vec(), b"bobby".to_vec(), b"cara".to_vec()]);
    }
}

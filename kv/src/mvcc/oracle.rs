//! The transaction manager: a monotonic tx-id allocator, an active-tx
//! min-heap, and a committed-tx conflict list. Grounded near-literally on
//! `examples/original_source/txn.go`'s `oracle`/`int64Heap`.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CResult, Error};

/// The set of keys a transaction wrote to, at the granularity conflict
/// detection operates on for each data-type family (spec.md §4.6 / §9's
/// Open Question resolutions, see DESIGN.md).
#[derive(Default, Clone)]
pub struct WriteSet {
    pub strings: HashSet<Vec<u8>>,
    pub hashes: HashSet<(Vec<u8>, Vec<u8>)>,
    pub sets: HashSet<(Vec<u8>, u32)>,
    pub lists: HashSet<Vec<u8>>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.hashes.is_empty() && self.sets.is_empty() && self.lists.is_empty()
    }

    fn conflicts_with(&self, other: &WriteSet) -> bool {
        self.strings.iter().any(|k| other.strings.contains(k))
            || self.hashes.iter().any(|k| other.hashes.contains(k))
            || self.sets.iter().any(|k| other.sets.contains(k))
            || self.lists.iter().any(|k| other.lists.contains(k))
    }
}

struct CommittedEntry {
    commit_ts: i64,
    writes: WriteSet,
}

/// A binary min-heap of active start timestamps with an index for O(log n)
/// remove-by-key (spec.md's Design Note: "supports O(log n) insertion, O(1)
/// min-peek, and O(log n) remove-by-key" — `std::collections::BinaryHeap`
/// alone doesn't offer remove-by-key, hence this small indexed variant).
struct ActiveHeap {
    heap: Vec<i64>,
    pos: HashMap<i64, usize>,
}

impl ActiveHeap {
    fn new() -> Self {
        ActiveHeap { heap: Vec::new(), pos: HashMap::new() }
    }

    fn push(&mut self, value: i64) {
        self.heap.push(value);
        let idx = self.heap.len() - 1;
        self.pos.insert(value, idx);
        self.sift_up(idx);
    }

    fn peek(&self) -> Option<i64> {
        self.heap.first().copied()
    }

    fn remove(&mut self, value: i64) -> bool {
        let idx = match self.pos.remove(&value) {
            Some(i) => i,
            None => return false,
        };
        let last = self.heap.len() - 1;
        self.swap(idx, last);
        self.heap.pop();
        if idx < self.heap.len() {
            self.sift_down(idx);
            self.sift_up(idx);
        }
        true
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.pos.insert(self.heap[i], i);
        self.pos.insert(self.heap[j], j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent] <= self.heap[i] {
                break;
            }
            self.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.heap.len() && self.heap[left] < self.heap[smallest] {
                smallest = left;
            }
            if right < self.heap.len() && self.heap[right] < self.heap[smallest] {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }
}

struct OracleInner {
    active: ActiveHeap,
    committed: Vec<CommittedEntry>,
}

/// Single process-wide transaction manager.
pub struct Oracle {
    tx_id: AtomicI64,
    inner: Mutex<OracleInner>,
}

impl Oracle {
    /// tx-id is seeded from wall-clock nanoseconds at open, giving uniqueness
    /// across restarts without any persisted counter.
    pub fn new() -> Self {
        let seed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as i64;
        Oracle {
            tx_id: AtomicI64::new(seed),
            inner: Mutex::new(OracleInner { active: ActiveHeap::new(), committed: Vec::new() }),
        }
    }

    fn next_id(&self) -> i64 {
        self.tx_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Assigns a start timestamp and records it as active. Never blocks.
    pub fn new_begin(&self) -> i64 {
        let start_ts = self.next_id();
        self.inner.lock().unwrap().active.push(start_ts);
        start_ts
    }

    pub fn has_conflict(&self, start_ts: i64, writes: &WriteSet) -> bool {
        if writes.is_empty() {
            return false;
        }
        let inner = self.inner.lock().unwrap();
        inner.committed.iter().any(|c| c.commit_ts > start_ts && c.writes.conflicts_with(writes))
    }

    /// Clears stale committed entries, assigns a commit timestamp, records
    /// the write set for future conflict checks, and retires the start
    /// timestamp from the active set. Returns the assigned commit-ts.
    pub fn new_commit(&self, start_ts: i64, writes: WriteSet) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let min_active = inner.active.peek();
        if let Some(min_active) = min_active {
            inner.committed.retain(|c| c.commit_ts > min_active);
        }
        let commit_ts = self.next_id();
        inner.committed.push(CommittedEntry { commit_ts, writes });
        inner.active.remove(start_ts);
        commit_ts
    }

    /// Retires a start timestamp without recording a commit (rollback path).
    pub fn discard_begin(&self, start_ts: i64) {
        self.inner.lock().unwrap().active.remove(start_ts);
    }

    pub fn peek_active(&self) -> CResult<i64> {
        self.inner.lock().unwrap().active.peek().ok_or(Error::HeapEmpty)
    }
}

impl Default for Oracle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_ids_are_monotonic_and_seeded_from_clock() {
        let oracle = Oracle::new();
        let a = oracle.new_begin();
        let b = oracle.new_begin();
        assert!(b > a);
        assert!(a > 0);
    }

    #[test]
    fn disjoint_writes_never_conflict() {
        let oracle = Oracle::new();
        let a_start = oracle.new_begin();
        let mut a_writes = WriteSet::default();
        a_writes.strings.insert(b"a".to_vec());
        oracle.new_commit(a_start, a_writes);

        let b_start = oracle.new_begin();
        let mut b_writes = WriteSet::default();
        b_writes.strings.insert(b"b".to_vec());
        assert!(!oracle.has_conflict(b_start, &b_writes));
    }

    #[test]
    fn overlapping_commit_after_start_conflicts() {
        let oracle = Oracle::new();
        let a_start = oracle.new_begin();

        let b_start = oracle.new_begin();
        let mut b_writes = WriteSet::default();
        b_writes.strings.insert(b"k".to_vec());
        oracle.new_commit(b_start, b_writes);

        let mut a_writes = WriteSet::default();
        a_writes.strings.insert(b"k".to_vec());
        assert!(oracle.has_conflict(a_start, &a_writes));
    }

    #[test]
    fn active_heap_removes_by_key() {
        let oracle = Oracle::new();
        let a = oracle.new_begin();
        let b = oracle.new_begin();
        assert_eq!(oracle.peek_active().unwrap(), a);
        oracle.discard_begin(a);
        assert_eq!(oracle.peek_active().unwrap(), b);
    }
}

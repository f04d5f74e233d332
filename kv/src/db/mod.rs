//! The database façade: directory locking, segment/index/oracle wiring,
//! recovery on open, the append/read pipeline every higher layer goes
//! through, and the non-transactional convenience operations. Grounded on
//! `examples/original_source/db.go`'s `DB` struct (`Put`/`Get`/`Del`,
//! `appendLogRecord`, `checkOptions`, `loadDataFile`/`loadIndex`),
//! generalized from its single data file to the segment set spec.md §4.3
//! describes and from string-only storage to all five data-type families.

mod recovery;

use std::fs::{File, OpenOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use fs4::FileExt;

use crate::codec::keys::{encode_tx_key, NO_TX_ID};
use crate::codec::record::{DataType, LogRecord, RecordType};
use crate::error::{CResult, Error};
use crate::index::Index;
use crate::merge;
use crate::mvcc::{IsolationLevel, Oracle, Transaction};
use crate::options::Options;
use crate::segment::{LogPos, SegmentSet};
use crate::ttl::{self, TtlScheduler};
use crate::watch::{CancelHandle, WatchEvent, WatchEventKind, WatcherManager};

const LOCK_FILE_NAME: &str = ".flock";

fn validate_key(key: &[u8]) -> CResult<()> {
    if key.is_empty() {
        return Err(Error::KeyEmpty);
    }
    if key.iter().any(|&b| b < 0x20 || b == 0x7f) {
        return Err(Error::KeyIsControlChar);
    }
    Ok(())
}

/// A hand-rolled reader/writer lock that, unlike `std::sync::RwLock`, can be
/// acquired in one call and released in another without the guard living
/// across the gap — exactly the shape a serializable transaction's lifetime
/// needs (spec.md §5: "held for the transaction's duration, not a single
/// call"). Read-committed commits use the same lock, taken and released
/// within one scope via `OracleCommitGuard`, so the two isolation levels
/// properly exclude each other.
struct OracleLockState {
    readers: u32,
    writer: bool,
}

struct OracleLock {
    state: Mutex<OracleLockState>,
    cond: Condvar,
}

impl OracleLock {
    fn new() -> Self {
        OracleLock { state: Mutex::new(OracleLockState { readers: 0, writer: false }), cond: Condvar::new() }
    }

    fn acquire(&self, exclusive: bool) {
        let mut state = self.state.lock().unwrap();
        if exclusive {
            while state.writer || state.readers > 0 {
                state = self.cond.wait(state).unwrap();
            }
            state.writer = true;
        } else {
            while state.writer {
                state = self.cond.wait(state).unwrap();
            }
            state.readers += 1;
        }
    }

    fn release(&self, exclusive: bool) {
        let mut state = self.state.lock().unwrap();
        if exclusive {
            state.writer = false;
        } else {
            state.readers -= 1;
        }
        self.cond.notify_all();
    }
}

/// RAII handle for a read-committed transaction's commit-time exclusive
/// hold on the oracle lock.
pub struct OracleCommitGuard<'a> {
    lock: &'a OracleLock,
}

impl Drop for OracleCommitGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(true);
    }
}

pub struct Database {
    pub(crate) options: Options,
    lock_file: File,
    pub(crate) segments: RwLock<SegmentSet>,
    pub(crate) index: Index,
    oracle: Oracle,
    oracle_lock: OracleLock,

    string_family_lock: RwLock<()>,
    hash_family_lock: RwLock<()>,
    set_family_lock: RwLock<()>,
    list_family_lock: RwLock<()>,

    ttl: TtlScheduler,
    watchers: WatcherManager,

    pub(crate) merging: AtomicBool,
    merge_stop: Arc<AtomicBool>,
    merge_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Database {
    /// Opens (creating if absent) the database at `options.dir_path`:
    /// acquires the directory lock, finishes or abandons any merge an
    /// earlier process was interrupted during, replays the log to rebuild
    /// every index, and starts the TTL scheduler and (if configured) the
    /// periodic merge thread.
    pub fn open(mut options: Options) -> CResult<Arc<Database>> {
        options.validate()?;
        std::fs::create_dir_all(&options.dir_path)?;

        let lock_file = OpenOptions::new().read(true).write(true).create(true).open(options.dir_path.join(LOCK_FILE_NAME))?;
        lock_file.try_lock_exclusive().map_err(|_| Error::DirectoryOccupied)?;

        merge::complete_pending_swap(&options.dir_path)?;

        let merge_boundary = merge::read_marker(&options.dir_path)?.unwrap_or(0);
        let hint_entries = if merge_boundary > 0 {
            merge::read_hint_entries(&options.dir_path.join(merge::HINT_FILE_NAME))?
        } else {
            Vec::new()
        };

        let mut segments = SegmentSet::open(&options.dir_path, options.data_file_size)?;
        let index = Index::new(options.index_type);

        recovery::seed_string_index_from_hint(&index, &hint_entries);
        recovery::recover(&mut segments, &index, merge_boundary)?;
        let pending_ttls = recovery::sweep_expired_and_collect_ttls(&mut segments, &index)?;

        let merge_stop = Arc::new(AtomicBool::new(false));

        let db = Arc::new_cyclic(|weak| {
            let ttl_weak = weak.clone();
            Database {
                options: options.clone(),
                lock_file,
                segments: RwLock::new(segments),
                index,
                oracle: Oracle::new(),
                oracle_lock: OracleLock::new(),
                string_family_lock: RwLock::new(()),
                hash_family_lock: RwLock::new(()),
                set_family_lock: RwLock::new(()),
                list_family_lock: RwLock::new(()),
                ttl: TtlScheduler::start(move |key| {
                    if let Some(db) = ttl_weak.upgrade() {
                        db.handle_ttl_expire(key);
                    }
                }),
                watchers: WatcherManager::new(),
                merging: AtomicBool::new(false),
                merge_stop,
                merge_handle: Mutex::new(None),
                closed: AtomicBool::new(false),
            }
        });

        for (key, expires_at_ns) in pending_ttls {
            db.ttl.schedule(key, expires_at_ns);
        }

        if options.merge_interval >= 60 {
            db.spawn_merge_scheduler();
        }

        Ok(db)
    }

    fn spawn_merge_scheduler(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = Duration::from_secs(self.options.merge_interval as u64);
        let stop = self.merge_stop.clone();
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if stop.load(Ordering::SeqCst) {
                break;
            }
            let Some(db) = weak.upgrade() else { break };
            match db.merge() {
                Ok(()) | Err(Error::InMerge) => {}
                Err(e) => log::warn!("scheduled merge failed: {}", e),
            }
        });
        *self.merge_handle.lock().unwrap() = Some(handle);
    }

    /// Flushes every segment, stops the TTL scheduler, watcher fan-out, and
    /// periodic merge thread, and releases the directory lock. Blocking on
    /// the oracle lock's exclusive mode first drains any in-flight
    /// serializable transaction (spec.md §5's close-drains-active-txns
    /// requirement, see DESIGN.md for the read-committed caveat).
    pub fn close(&self) -> CResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.oracle_lock.acquire(true);
        self.merge_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.merge_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.ttl.stop();
        self.watchers.stop();
        self.segments.write().unwrap().sync_all()?;
        FileExt::unlock(&self.lock_file)?;
        Ok(())
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    pub(crate) fn index(&self) -> &Index {
        &self.index
    }

    pub(crate) fn acquire_serializable(&self, read_only: bool) {
        self.oracle_lock.acquire(!read_only);
    }

    pub(crate) fn release_serializable(&self, read_only: bool) {
        self.oracle_lock.release(!read_only);
    }

    pub(crate) fn oracle_commit_lock(&self) -> OracleCommitGuard<'_> {
        self.oracle_lock.acquire(true);
        OracleCommitGuard { lock: &self.oracle_lock }
    }

    /// Encodes and appends `record` to the active segment, rolling over if
    /// it would overflow, and applies the configured sync policy. Every
    /// write in the system — transactional or not — funnels through here
    /// (spec.md §4.8).
    pub(crate) fn append(&self, record: &LogRecord) -> CResult<LogPos> {
        let (bytes, len) = record.encode();
        let mut segments = self.segments.write().unwrap();
        let pos = segments.append(&bytes)?;
        segments.maybe_sync(len as u64, self.options.sync_on_write, self.options.bytes_per_sync)?;
        Ok(pos)
    }

    /// Fsyncs every segment. Exposed for callers (e.g. `WriteBatch`) that
    /// want a durability point without waiting for the next automatic sync.
    pub fn sync(&self) -> CResult<()> {
        self.segments.write().unwrap().sync_all()
    }

    pub(crate) fn read_record_at(&self, pos: LogPos) -> CResult<LogRecord> {
        self.segments.write().unwrap().read_at(pos)
    }

    /// Resolves a position to its value, treating a tombstone or an
    /// already-expired TTL as `NotFound` even if the deleter thread hasn't
    /// caught up yet (spec.md §4.2's "not returned by get" invariant).
    pub(crate) fn read_value(&self, pos: LogPos) -> CResult<Vec<u8>> {
        let record = self.read_record_at(pos)?;
        if record.record_type == RecordType::Deleted {
            return Err(Error::NotFound);
        }
        if record.expiration_ns != 0 && record.expiration_ns <= ttl::now_ns() {
            return Err(Error::NotFound);
        }
        Ok(record.value)
    }

    pub(crate) fn notify_watchers(&self, key: &[u8], kind: WatchEventKind) {
        if !self.watchers.watched(key) {
            return;
        }
        let value = match kind {
            WatchEventKind::Put => self.index.string_index().get(key).and_then(|pos| self.read_value(pos).ok()),
            WatchEventKind::Delete => None,
        };
        self.watchers.notify(WatchEvent { key: key.to_vec(), kind, value });
    }

    pub fn watch(&self, key: &[u8]) -> (crossbeam_channel::Receiver<WatchEvent>, CancelHandle) {
        self.watchers.watch(key.to_vec())
    }

    /// Begins a new transaction. See `mvcc::Transaction` for the full typed
    /// operation set available on it.
    pub fn begin(self: &Arc<Self>, read_only: bool, isolation: IsolationLevel) -> CResult<Transaction> {
        Transaction::new(self.clone(), read_only, isolation)
    }

    /// Runs `f` inside a fresh transaction, committing on success and
    /// rolling back on error. Under read-committed isolation, a lost
    /// write-write race is retried automatically rather than surfaced to
    /// the caller (spec.md §9: "the caller may retry if so configured").
    pub fn execute<T>(
        self: &Arc<Self>,
        isolation: IsolationLevel,
        read_only: bool,
        mut f: impl FnMut(&mut Transaction) -> CResult<T>,
    ) -> CResult<T> {
        loop {
            let mut txn = self.begin(read_only, isolation)?;
            match f(&mut txn) {
                Ok(value) => match txn.commit() {
                    Ok(()) => return Ok(value),
                    Err(Error::Conflict) if isolation == IsolationLevel::ReadCommitted => continue,
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    txn.rollback();
                    return Err(e);
                }
            }
        }
    }

    fn handle_ttl_expire(&self, key: &[u8]) {
        let Some(pos) = self.index.string_index().get(key) else { return };
        let Ok(record) = self.read_record_at(pos) else { return };
        if record.record_type == RecordType::Deleted {
            return;
        }
        if record.expiration_ns == 0 || record.expiration_ns > ttl::now_ns() {
            return;
        }
        let _guard = self.string_family_lock.write().unwrap();
        let tombstone = LogRecord::new(RecordType::Deleted, DataType::String, encode_tx_key(NO_TX_ID, key), Vec::new());
        if self.append(&tombstone).is_ok() {
            self.index.string_index().delete(key);
            self.notify_watchers(key, WatchEventKind::Delete);
        }
    }

    // ---- non-transactional string convenience ops ----

    pub fn get(&self, key: &[u8]) -> CResult<Vec<u8>> {
        validate_key(key)?;
        let _guard = self.string_family_lock.read().unwrap();
        let pos = self.index.string_index().get(key).ok_or(Error::NotFound)?;
        self.read_value(pos)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.index.string_index().get(key).map(|pos| self.read_value(pos).is_ok()).unwrap_or(false)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> CResult<()> {
        validate_key(key)?;
        let _guard = self.string_family_lock.write().unwrap();
        let record = LogRecord::new(RecordType::Normal, DataType::String, encode_tx_key(NO_TX_ID, key), value.to_vec());
        let pos = self.append(&record)?;
        if !self.index.string_index().put(key, pos) {
            return Err(Error::UpdateIndexFailed);
        }
        self.ttl.cancel(key.to_vec());
        self.notify_watchers(key, WatchEventKind::Put);
        Ok(())
    }

    /// Like `put`, but the value expires `ttl` from now: once a `get`
    /// observes the expiry has passed, it stops returning the value even
    /// before the deleter thread physically removes it (spec.md §4.2).
    pub fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> CResult<()> {
        validate_key(key)?;
        let _guard = self.string_family_lock.write().unwrap();
        let expires_at_ns = ttl::now_ns() + ttl.as_nanos() as u64;
        let record = LogRecord::new(RecordType::Normal, DataType::String, encode_tx_key(NO_TX_ID, key), value.to_vec())
            .with_expiration(expires_at_ns);
        let pos = self.append(&record)?;
        if !self.index.string_index().put(key, pos) {
            return Err(Error::UpdateIndexFailed);
        }
        self.ttl.schedule(key.to_vec(), expires_at_ns);
        self.notify_watchers(key, WatchEventKind::Put);
        Ok(())
    }

    /// Clears any pending TTL on `key`, leaving its current value in place
    /// indefinitely.
    pub fn persist(&self, key: &[u8]) {
        self.ttl.cancel(key.to_vec());
    }

    pub fn del(&self, key: &[u8]) -> CResult<()> {
        validate_key(key)?;
        let _guard = self.string_family_lock.write().unwrap();
        if self.index.string_index().get(key).is_none() {
            return Ok(());
        }
        let record = LogRecord::new(RecordType::Deleted, DataType::String, encode_tx_key(NO_TX_ID, key), Vec::new());
        self.append(&record)?;
        self.index.string_index().delete(key);
        self.ttl.cancel(key.to_vec());
        self.notify_watchers(key, WatchEventKind::Delete);
        Ok(())
    }

    pub fn str_len(&self, key: &[u8]) -> CResult<usize> {
        Ok(self.get(key)?.len())
    }

    pub fn set_if_absent(&self, key: &[u8], value: &[u8]) -> CResult<()> {
        if self.exists(key) {
            return Err(Error::KeyExists);
        }
        self.put(key, value)
    }

    pub fn get_set(&self, key: &[u8], value: &[u8]) -> CResult<Vec<u8>> {
        let old = self.get(key);
        self.put(key, value)?;
        old
    }

    pub fn incr_by(&self, key: &[u8], delta: i64) -> CResult<i64> {
        validate_key(key)?;
        let _guard = self.string_family_lock.write().unwrap();
        // Inlined index lookup rather than `self.get(key)`: that call would
        // re-acquire `string_family_lock` for reading while this thread
        // already holds it exclusively, and `RwLock` isn't reentrant.
        let current: i64 = match self.index.string_index().get(key).map(|pos| self.read_value(pos)) {
            Some(Ok(v)) => std::str::from_utf8(&v).ok().and_then(|s| s.parse().ok()).ok_or(Error::NotAnInteger)?,
            Some(Err(Error::NotFound)) | None => 0,
            Some(Err(e)) => return Err(e),
        };
        let next = current + delta;

        let record = LogRecord::new(RecordType::Normal, DataType::String, encode_tx_key(NO_TX_ID, key), next.to_string().into_bytes());
        let pos = self.append(&record)?;
        if !self.index.string_index().put(key, pos) {
            return Err(Error::UpdateIndexFailed);
        }
        self.ttl.cancel(key.to_vec());
        drop(_guard);
        self.notify_watchers(key, WatchEventKind::Put);
        Ok(next)
    }

    pub fn incr(&self, key: &[u8]) -> CResult<i64> {
        self.incr_by(key, 1)
    }

    pub fn decr(&self, key: &[u8]) -> CResult<i64> {
        self.incr_by(key, -1)
    }

    pub fn append_value(&self, key: &[u8], value: &[u8]) -> CResult<()> {
        let mut current = match self.get(key) {
            Ok(v) => v,
            Err(Error::NotFound) => Vec::new(),
            Err(e) => return Err(e),
        };
        current.extend_from_slice(value);
        self.put(key, &current)
    }

    pub fn m_set(&self, pairs: &[Vec<u8>]) -> CResult<()> {
        if pairs.len() % 2 != 0 {
            return Err(Error::BadArgs);
        }
        for chunk in pairs.chunks_exact(2) {
            self.put(&chunk[0], &chunk[1])?;
        }
        Ok(())
    }

    pub fn m_get(&self, keys: &[Vec<u8>]) -> CResult<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(key) {
                Ok(v) => out.push(Some(v)),
                Err(Error::NotFound) => out.push(None),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    // ---- hash/set/list convenience ops: each a one-shot read-committed
    // transaction, reusing the well-exercised `Transaction` logic rather
    // than duplicating it at the facade (spec.md §4.8 only asks for a
    // "non-transactional convenience" surface, not a separate code path).

    pub fn hash_set(self: &Arc<Self>, key: &[u8], field: &[u8], value: &[u8]) -> CResult<()> {
        let _guard = self.hash_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.hash_set(key, field, value))
    }

    pub fn hash_get(self: &Arc<Self>, key: &[u8], field: &[u8]) -> CResult<Vec<u8>> {
        let _guard = self.hash_family_lock.read().unwrap();
        let txn = self.begin(true, IsolationLevel::ReadCommitted)?;
        let result = txn.hash_get(key, field);
        txn.rollback();
        result
    }

    pub fn hash_del(self: &Arc<Self>, key: &[u8], field: &[u8]) -> CResult<()> {
        let _guard = self.hash_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.hash_del(key, field))
    }

    pub fn hash_exists(self: &Arc<Self>, key: &[u8], field: &[u8]) -> bool {
        let _guard = self.hash_family_lock.read().unwrap();
        let Ok(txn) = self.begin(true, IsolationLevel::ReadCommitted) else { return false };
        let result = txn.hash_exists(key, field);
        txn.rollback();
        result
    }

    pub fn hash_get_all(self: &Arc<Self>, key: &[u8]) -> CResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
        let _guard = self.hash_family_lock.read().unwrap();
        let txn = self.begin(true, IsolationLevel::ReadCommitted)?;
        let result = txn.hash_get_all(key);
        txn.rollback();
        result
    }

    pub fn hash_len(self: &Arc<Self>, key: &[u8]) -> CResult<usize> {
        let _guard = self.hash_family_lock.read().unwrap();
        let txn = self.begin(true, IsolationLevel::ReadCommitted)?;
        let result = txn.hash_len(key);
        txn.rollback();
        result
    }

    pub fn set_add(self: &Arc<Self>, key: &[u8], members: &[Vec<u8>]) -> CResult<()> {
        let _guard = self.set_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.set_add(key, members))
    }

    pub fn set_rem(self: &Arc<Self>, key: &[u8], members: &[Vec<u8>]) -> CResult<()> {
        let _guard = self.set_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.set_rem(key, members))
    }

    pub fn set_is_member(self: &Arc<Self>, key: &[u8], member: &[u8]) -> bool {
        let _guard = self.set_family_lock.read().unwrap();
        let Ok(txn) = self.begin(true, IsolationLevel::ReadCommitted) else { return false };
        let result = txn.set_is_member(key, member);
        txn.rollback();
        result
    }

    pub fn set_members(self: &Arc<Self>, key: &[u8]) -> CResult<Vec<Vec<u8>>> {
        let _guard = self.set_family_lock.read().unwrap();
        let txn = self.begin(true, IsolationLevel::ReadCommitted)?;
        let result = txn.set_members(key);
        txn.rollback();
        result
    }

    pub fn set_card(self: &Arc<Self>, key: &[u8]) -> CResult<usize> {
        Ok(self.set_members(key)?.len())
    }

    pub fn l_push(self: &Arc<Self>, key: &[u8], values: &[Vec<u8>]) -> CResult<()> {
        let _guard = self.list_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.l_push(key, values))
    }

    pub fn r_push(self: &Arc<Self>, key: &[u8], values: &[Vec<u8>]) -> CResult<()> {
        let _guard = self.list_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.r_push(key, values))
    }

    pub fn l_pop(self: &Arc<Self>, key: &[u8]) -> CResult<Vec<u8>> {
        let _guard = self.list_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.l_pop(key))
    }

    pub fn r_pop(self: &Arc<Self>, key: &[u8]) -> CResult<Vec<u8>> {
        let _guard = self.list_family_lock.write().unwrap();
        self.execute(IsolationLevel::ReadCommitted, false, |txn| txn.r_pop(key))
    }

    pub fn l_len(self: &Arc<Self>, key: &[u8]) -> CResult<usize> {
        let _guard = self.list_family_lock.read().unwrap();
        let txn = self.begin(true, IsolationLevel::ReadCommitted)?;
        let result = txn.l_len(key);
        txn.rollback();
        result
    }

    /// Triggers one merge pass; see `merge::Database::merge` (spec.md §4.10).
    pub fn compact(self: &Arc<Self>) -> CResult<()> {
        self.merge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn open_db(dir: &std::path::Path) -> Arc<Database> {
        let mut options = Options::default();
        options.dir_path = dir.to_path_buf();
        Database::open(options).unwrap()
    }

    #[test]
    fn put_get_del_roundtrip() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        db.put(b"a", b"1").unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());

        db.del(b"a").unwrap();
        assert_eq!(db.get(b"a").unwrap_err(), Error::NotFound);
    }

    #[test]
    fn empty_key_is_rejected() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        assert_eq!(db.put(b"", b"x").unwrap_err(), Error::KeyEmpty);
    }

    #[test]
    fn control_character_key_is_rejected() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        assert_eq!(db.put(&[0x02], b"x").unwrap_err(), Error::KeyIsControlChar);
    }

    #[test]
    fn reopening_a_locked_directory_fails() {
        let dir = tempdir().unwrap();
        let _db = open_db(dir.path());
        let mut options = Options::default();
        options.dir_path = dir.path().to_path_buf();
        assert_eq!(Database::open(options).unwrap_err(), Error::DirectoryOccupied);
    }

    #[test]
    fn restart_recovers_committed_state() {
        let dir = tempdir().unwrap();
        {
            let db = open_db(dir.path());
            db.put(b"a", b"1").unwrap();
            db.close().unwrap();
        }
        let db = open_db(dir.path());
        assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());
    }

    #[test]
    fn ttl_expiry_hides_value_before_deleter_runs() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        db.put_with_ttl(b"a", b"1", Duration::from_nanos(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(db.get(b"a").unwrap_err(), Error::NotFound);
    }

    #[test]
    fn watch_observes_put_then_delete() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        let (rx, _handle) = db.watch(b"a");
        db.put(b"a", b"1").unwrap();
        db.del(b"a").unwrap();

        let e1 = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let e2 = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(e1.kind, WatchEventKind::Put);
        assert_eq!(e2.kind, WatchEventKind::Delete);
    }

    #[test]
    fn list_push_and_pop_in_order() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        db.r_push(b"l", &[b"a".to_vec(), b"b".to_vec()]).unwrap();
        db.l_push(b"l", &[b"z".to_vec()]).unwrap();
        assert_eq!(db.l_pop(b"l").unwrap(), b"z".to_vec());
        assert_eq!(db.l_pop(b"l").unwrap(), b"a".to_vec());
        assert_eq!(db.r_pop(b"l").unwrap(), b"b".to_vec());
        assert_eq!(db.l_len(b"l").unwrap_err(), Error::NotFound);
    }

    #[test]
    fn incr_and_decr_treat_missing_key_as_zero() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        assert_eq!(db.incr(b"counter").unwrap(), 1);
        assert_eq!(db.incr(b"counter").unwrap(), 2);
        assert_eq!(db.decr(b"counter").unwrap(), 1);
        assert_eq!(db.get(b"counter").unwrap(), b"1".to_vec());
    }

    #[test]
    fn incr_by_applies_the_given_delta() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        db.put(b"n", b"10").unwrap();
        assert_eq!(db.incr_by(b"n", 5).unwrap(), 15);
        assert_eq!(db.incr_by(b"n", -20).unwrap(), -5);
        assert_eq!(db.get(b"n").unwrap(), b"-5".to_vec());
    }

    #[test]
    fn incr_on_non_integer_value_fails() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        db.put(b"n", b"not-a-number").unwrap();
        assert_eq!(db.incr(b"n").unwrap_err(), Error::NotAnInteger);
    }

    #[test]
    fn get_set_returns_old_value_and_installs_new_one() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        db.put(b"a", b"1").unwrap();
        assert_eq!(db.get_set(b"a", b"2").unwrap(), b"1".to_vec());
        assert_eq!(db.get(b"a").unwrap(), b"2".to_vec());

        assert_eq!(db.get_set(b"b", b"3").unwrap_err(), Error::NotFound);
        assert_eq!(db.get(b"b").unwrap(), b"3".to_vec());
    }

    #[test]
    fn str_len_reports_value_byte_length() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        db.put(b"a", b"hello").unwrap();
        assert_eq!(db.str_len(b"a").unwrap(), 5);
    }

    #[test]
    fn append_value_creates_then_concatenates() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        db.append_value(b"a", b"hello").unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"hello".to_vec());
        db.append_value(b"a", b" world").unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"hello world".to_vec());
    }
}

//! Write batch: accumulates string put/delete operations locally and
//! applies them as a single atomic unit on `commit`. Grounded on
//! `examples/original_source/batch.go`'s `WriteBatch` (a `pendingWrite` map
//! keyed by key, last write wins, flushed as one begin/commit block), but
//! built on top of `mvcc::Transaction` rather than duplicating its
//! begin/commit-marker bookkeeping: a batch is simply a one-shot,
//! read-committed transaction with a local buffer in front of it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::Database;
use crate::error::{CResult, Error};
use crate::mvcc::IsolationLevel;

enum PendingOp {
    Put(Vec<u8>),
    Delete,
}

pub struct WriteBatch {
    db: Arc<Database>,
    sync_on_commit: bool,
    pending: Mutex<HashMap<Vec<u8>, PendingOp>>,
}

impl WriteBatch {
    pub(crate) fn new(db: Arc<Database>, sync_on_commit: bool) -> Self {
        WriteBatch { db, sync_on_commit, pending: Mutex::new(HashMap::new()) }
    }

    /// Buffers a put, overwriting any pending operation already queued for
    /// `key`. Not written to the log until `commit`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CResult<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.pending.lock().unwrap().insert(key.to_vec(), PendingOp::Put(value.to_vec()));
        Ok(())
    }

    /// Buffers a delete. If `key` has no existing value and no pending put,
    /// this is a no-op at commit time, same as the original.
    pub fn delete(&self, key: &[u8]) -> CResult<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.pending.lock().unwrap().insert(key.to_vec(), PendingOp::Delete);
        Ok(())
    }

    /// Applies every buffered operation inside one read-committed
    /// transaction: all-or-nothing, visible to other readers only once
    /// this call returns. Clears the pending buffer on success so the same
    /// batch can be reused for a following round, mirroring the original's
    /// `pendingWrite` reset at the end of `Commit`.
    pub fn commit(&self) -> CResult<()> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return Ok(());
        }

        let mut txn = self.db.begin(false, IsolationLevel::ReadCommitted)?;
        for (key, op) in pending.iter() {
            let result = match op {
                PendingOp::Put(value) => txn.set(key, value),
                PendingOp::Delete => txn.del(key),
            };
            if let Err(e) = result {
                txn.rollback();
                return Err(e);
            }
        }
        txn.commit()?;

        if self.sync_on_commit {
            self.db.sync()?;
        }

        pending.clear();
        Ok(())
    }
}

impl Database {
    /// Opens a new write batch bound to this database (spec.md §2 row 13).
    pub fn new_write_batch(self: &Arc<Self>, sync_on_commit: bool) -> WriteBatch {
        WriteBatch::new(self.clone(), sync_on_commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn open_db(dir: &std::path::Path) -> Arc<Database> {
        let mut options = Options::default();
        options.dir_path = dir.to_path_buf();
        Database::open(options).unwrap()
    }

    #[test]
    fn uncommitted_batch_is_not_visible() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        let batch = db.new_write_batch(false);
        batch.put(b"a", b"1").unwrap();
        assert_eq!(db.get(b"a").unwrap_err(), Error::NotFound);
    }

    #[test]
    fn committed_batch_applies_all_operations() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        db.put(b"stale", b"0").unwrap();

        let batch = db.new_write_batch(false);
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.delete(b"stale").unwrap();
        batch.commit().unwrap();

        assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());
        assert_eq!(db.get(b"b").unwrap(), b"2".to_vec());
        assert_eq!(db.get(b"stale").unwrap_err(), Error::NotFound);
    }

    #[test]
    fn last_write_wins_per_key_before_commit() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        let batch = db.new_write_batch(false);
        batch.put(b"a", b"1").unwrap();
        batch.put(b"a", b"2").unwrap();
        batch.delete(b"a").unwrap();
        batch.put(b"a", b"3").unwrap();
        batch.commit().unwrap();

        assert_eq!(db.get(b"a").unwrap(), b"3".to_vec());
    }

    #[test]
    fn reused_batch_starts_empty_after_commit() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        let batch = db.new_write_batch(false);
        batch.put(b"a", b"1").unwrap();
        batch.commit().unwrap();
        batch.commit().unwrap();

        assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());
    }
}

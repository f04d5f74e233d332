//! The per-transaction object: pending-write buffers plus begin/commit/
//! rollback and the typed string/hash/set/list operations layered on top.
//! Grounded on `examples/original_source/txn.go`, `txnHash.go`, `txnSet.go`,
//! and spec.md §4.7/§4.7.1 (list design follows the spec literally rather
//! than `txnList.go`, whose `LPop`/`RPop` are stubs in the original).

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::keys::{decode_list_data_key, decode_tx_key, encode_hash_key, encode_list_data_key,
    encode_list_meta_key, encode_list_meta_value, encode_set_key, encode_tx_key, set_member_hash};
use crate::codec::record::{sentinel, DataType, LogRecord, RecordType};
use crate::db::Database;
use crate::error::{CResult, Error};
use crate::index::set_member_index_key;
use crate::mvcc::oracle::WriteSet;
use crate::mvcc::rational::Rational;
use crate::segment::LogPos;
use crate::watch::WatchEventKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    Serializable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tag {
    Normal,
    Deleted,
}

#[derive(Clone, Copy, Debug)]
struct PendingWrite {
    tag: Tag,
    pos: LogPos,
}

pub struct Transaction {
    db: Arc<Database>,
    read_only: bool,
    isolation: IsolationLevel,
    start_ts: i64,
    commit_ts: i64,
    finished: bool,

    strings: HashMap<Vec<u8>, PendingWrite>,
    hashes: HashMap<Vec<u8>, HashMap<Vec<u8>, PendingWrite>>,
    sets: HashMap<Vec<u8>, HashMap<Vec<u8>, PendingWrite>>,
    list_meta: HashMap<Vec<u8>, PendingWrite>,
    list_data: HashMap<Vec<u8>, HashMap<Vec<u8>, PendingWrite>>,
}

impl Transaction {
    pub(crate) fn new(db: Arc<Database>, read_only: bool, isolation: IsolationLevel) -> CResult<Self> {
        let start_ts = db.oracle().new_begin();

        if isolation == IsolationLevel::Serializable {
            db.acquire_serializable(read_only);
        }

        let begin_key = encode_tx_key(start_ts as u64, sentinel::TX_BEGIN_KEY);
        let record = LogRecord::new(RecordType::TxBegin, DataType::String, begin_key, Vec::new());
        db.append(&record)?;

        Ok(Transaction {
            db,
            read_only,
            isolation,
            start_ts,
            commit_ts: 0,
            finished: false,
            strings: HashMap::new(),
            hashes: HashMap::new(),
            sets: HashMap::new(),
            list_meta: HashMap::new(),
            list_data: HashMap::new(),
        })
    }

    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    pub fn commit_ts(&self) -> i64 {
        self.commit_ts
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self) -> CResult<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn append_tx_record(&self, data_type: DataType, inner_key: Vec<u8>, value: Vec<u8>, deleted: bool) -> CResult<LogPos> {
        let key = encode_tx_key(self.start_ts as u64, &inner_key);
        let record_type = if deleted { RecordType::Deleted } else { RecordType::Normal };
        let record = LogRecord::new(record_type, data_type, key, value);
        self.db.append(&record)
    }

    fn write_set(&self) -> WriteSet {
        let mut ws = WriteSet::default();
        for key in self.strings.keys() {
            ws.strings.insert(key.clone());
        }
        for (outer, fields) in &self.hashes {
            for field in fields.keys() {
                ws.hashes.insert((outer.clone(), field.clone()));
            }
        }
        for (outer, members) in &self.sets {
            for member in members.keys() {
                let hash = set_member_hash(member);
                ws.sets.insert((outer.clone(), hash));
            }
        }
        for outer in self.list_meta.keys() {
            ws.lists.insert(outer.clone());
        }
        for outer in self.list_data.keys() {
            ws.lists.insert(outer.clone());
        }
        ws
    }

    /// Applies every pending-write buffer to its index family. Grounded on
    /// `txn.go`'s `updateStrIndex`/`updateHashIndex`/`updateSetIndex`/
    /// `updateListIndex`, run concurrently via scoped threads rather than
    /// goroutines + a waitgroup (spec.md §4.7: "apply... in parallel").
    fn apply_to_index(&self) {
        let index = self.db.index();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for (key, pw) in &self.strings {
                    match pw.tag {
                        Tag::Normal => {
                            index.string_index().put(key, pw.pos);
                        }
                        Tag::Deleted => {
                            index.string_index().delete(key);
                        }
                    }
                }
            });
            scope.spawn(|| {
                for (outer, fields) in &self.hashes {
                    let table = index.set_hash_index(outer);
                    for (field, pw) in fields {
                        match pw.tag {
                            Tag::Normal => {
                                table.put(field, pw.pos);
                            }
                            Tag::Deleted => {
                                table.delete(field);
                            }
                        }
                    }
                    index.prune_hash_index(outer);
                }
            });
            scope.spawn(|| {
                for (outer, members) in &self.sets {
                    let table = index.set_set_index(outer);
                    for (member, pw) in members {
                        let member_key = set_member_index_key(member);
                        match pw.tag {
                            Tag::Normal => {
                                table.put(&member_key, pw.pos);
                            }
                            Tag::Deleted => {
                                table.delete(&member_key);
                            }
                        }
                    }
                    index.prune_set_index(outer);
                }
            });
            scope.spawn(|| {
                for (outer, pw) in &self.list_meta {
                    match pw.tag {
                        Tag::Normal => {
                            index.list_meta_index().put(outer, pw.pos);
                        }
                        Tag::Deleted => {
                            index.list_meta_index().delete(outer);
                        }
                    }
                }
                for (outer, entries) in &self.list_data {
                    let table = index.set_list_data_index(outer);
                    for (seq_bytes, pw) in entries {
                        match pw.tag {
                            Tag::Normal => {
                                table.put(seq_bytes, pw.pos);
                            }
                            Tag::Deleted => {
                                table.delete(seq_bytes);
                            }
                        }
                    }
                    index.prune_list_data_index(outer);
                }
            });
        });
    }

    fn notify_watchers(&self) {
        for (key, pw) in &self.strings {
            let kind = match pw.tag {
                Tag::Normal => WatchEventKind::Put,
                Tag::Deleted => WatchEventKind::Delete,
            };
            self.db.notify_watchers(key, kind);
        }
    }

    /// Checks for conflicts (read-committed only; serializable transactions
    /// are serialised by the database's single-writer lock and never
    /// conflict), appends the commit marker, applies the pending writes, and
    /// retires the start timestamp. On conflict, rolls back with
    /// `Error::Conflict`.
    pub fn commit(mut self) -> CResult<()> {
        self.commit_inner()
    }

    fn commit_inner(&mut self) -> CResult<()> {
        if self.finished {
            return Ok(());
        }

        let _commit_guard = if self.isolation == IsolationLevel::ReadCommitted {
            Some(self.db.oracle_commit_lock())
        } else {
            None
        };

        let writes = self.write_set();
        let conflict = self.isolation == IsolationLevel::ReadCommitted && self.db.oracle().has_conflict(self.start_ts, &writes);

        if conflict {
            self.rollback_inner();
            return Err(Error::Conflict);
        }

        let commit_key = encode_tx_key(self.start_ts as u64, sentinel::TX_COMMIT_KEY);
        let record = LogRecord::new(RecordType::TxCommit, DataType::String, commit_key, Vec::new());
        self.db.append(&record)?;

        self.apply_to_index();
        self.commit_ts = self.db.oracle().new_commit(self.start_ts, writes);
        self.notify_watchers();

        if self.isolation == IsolationLevel::Serializable {
            self.db.release_serializable(self.read_only);
        }

        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) {
        self.rollback_inner();
    }

    fn rollback_inner(&mut self) {
        if self.finished {
            return;
        }
        let rollback_key = encode_tx_key(self.start_ts as u64, sentinel::TX_ROLLBACK_KEY);
        let record = LogRecord::new(RecordType::TxRollback, DataType::String, rollback_key, Vec::new());
        let _ = self.db.append(&record);
        self.db.oracle().discard_begin(self.start_ts);

        if self.isolation == IsolationLevel::Serializable {
            self.db.release_serializable(self.read_only);
        }
        self.finished = true;
    }

    // ---- string family ----

    pub fn get(&self, key: &[u8]) -> CResult<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        if let Some(pw) = self.strings.get(key) {
            return match pw.tag {
                Tag::Normal => self.db.read_value(pw.pos),
                Tag::Deleted => Err(Error::NotFound),
            };
        }
        let pos = self.db.index().string_index().get(key).ok_or(Error::NotFound)?;
        self.db.read_value(pos)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        if let Some(pw) = self.strings.get(key) {
            return pw.tag == Tag::Normal;
        }
        self.db.index().string_index().get(key).is_some()
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> CResult<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.check_writable()?;
        let pos = self.append_tx_record(DataType::String, key.to_vec(), value.to_vec(), false)?;
        self.strings.insert(key.to_vec(), PendingWrite { tag: Tag::Normal, pos });
        Ok(())
    }

    pub fn del(&mut self, key: &[u8]) -> CResult<()> {
        self.check_writable()?;
        let pos = self.append_tx_record(DataType::String, key.to_vec(), Vec::new(), true)?;
        self.strings.insert(key.to_vec(), PendingWrite { tag: Tag::Deleted, pos });
        Ok(())
    }

    pub fn set_if_absent(&mut self, key: &[u8], value: &[u8]) -> CResult<()> {
        if self.exists(key) {
            return Err(Error::KeyExists);
        }
        self.set(key, value)
    }

    pub fn get_set(&mut self, key: &[u8], value: &[u8]) -> CResult<Vec<u8>> {
        let old = self.get(key);
        self.set(key, value)?;
        old
    }

    pub fn str_len(&self, key: &[u8]) -> CResult<usize> {
        Ok(self.get(key)?.len())
    }

    pub fn incr(&mut self, key: &[u8]) -> CResult<i64> {
        self.incr_by(key, 1)
    }

    pub fn decr(&mut self, key: &[u8]) -> CResult<i64> {
        self.incr_by(key, -1)
    }

    pub fn incr_by(&mut self, key: &[u8], delta: i64) -> CResult<i64> {
        let current: i64 = match self.get(key) {
            Ok(v) => std::str::from_utf8(&v).ok().and_then(|s| s.parse().ok()).ok_or(Error::NotAnInteger)?,
            Err(Error::NotFound) => 0,
            Err(e) => return Err(e),
        };
        let next = current + delta;
        self.set(key, next.to_string().as_bytes())?;
        Ok(next)
    }

    pub fn decr_by(&mut self, key: &[u8], delta: i64) -> CResult<i64> {
        self.incr_by(key, -delta)
    }

    pub fn append(&mut self, key: &[u8], value: &[u8]) -> CResult<()> {
        if !self.exists(key) {
            return self.set(key, value);
        }
        let mut current = self.get(key)?;
        current.extend_from_slice(value);
        self.set(key, &current)
    }

    pub fn m_set(&mut self, pairs: &[Vec<u8>]) -> CResult<()> {
        if pairs.len() % 2 != 0 {
            return Err(Error::BadArgs);
        }
        for chunk in pairs.chunks_exact(2) {
            self.set(&chunk[0], &chunk[1])?;
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

    // ---- hash family ----

    pub fn hash_set(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> CResult<()> {
        self.check_writable()?;
        let inner = encode_hash_key(key, field);
        let pos = self.append_tx_record(DataType::Hash, inner, value.to_vec(), false)?;
        self.hashes.entry(key.to_vec()).or_default().insert(field.to_vec(), PendingWrite { tag: Tag::Normal, pos });
        Ok(())
    }

    pub fn hash_get(&self, key: &[u8], field: &[u8]) -> CResult<Vec<u8>> {
        if let Some(pw) = self.hashes.get(key).and_then(|m| m.get(field)) {
            return match pw.tag {
                Tag::Normal => self.db.read_value(pw.pos),
                Tag::Deleted => Err(Error::NotFound),
            };
        }
        let table = self.db.index().hash_index(key).ok_or(Error::NotFound)?;
        let pos = table.get(field).ok_or(Error::NotFound)?;
        self.db.read_value(pos)
    }

    pub fn hash_del(&mut self, key: &[u8], field: &[u8]) -> CResult<()> {
        self.check_writable()?;
        if !self.hash_exists(key, field) {
            return Err(Error::NotFound);
        }
        let inner = encode_hash_key(key, field);
        let pos = self.append_tx_record(DataType::Hash, inner, Vec::new(), true)?;
        self.hashes.entry(key.to_vec()).or_default().insert(field.to_vec(), PendingWrite { tag: Tag::Deleted, pos });
        Ok(())
    }

    pub fn hash_exists(&self, key: &[u8], field: &[u8]) -> bool {
        if let Some(pw) = self.hashes.get(key).and_then(|m| m.get(field)) {
            return pw.tag == Tag::Normal;
        }
        self.db.index().hash_index(key).map(|t| t.get(field).is_some()).unwrap_or(false)
    }

    pub fn hash_get_all(&self, key: &[u8]) -> CResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
        let mut fields = Vec::new();
        let mut values = Vec::new();
        let pending = self.hashes.get(key);

        if let Some(table) = self.db.index().hash_index(key) {
            let mut it = table.iterator(false);
            it.rewind();
            while it.valid() {
                let field = it.key().to_vec();
                if pending.map(|m| m.contains_key(&field)).unwrap_or(false) {
                    it.next();
                    continue;
                }
                if let Some(pos) = it.value() {
                    values.push(self.db.read_value(pos)?);
                    fields.push(field);
                }
                it.next();
            }
        }
        if let Some(pending) = pending {
            for (field, pw) in pending {
                if pw.tag == Tag::Normal {
                    fields.push(field.clone());
                    values.push(self.db.read_value(pw.pos)?);
                }
            }
        }
        Ok((fields, values))
    }

    pub fn hash_keys(&self, key: &[u8]) -> CResult<Vec<Vec<u8>>> {
        let (fields, _) = self.hash_get_all(key)?;
        if fields.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(fields)
    }

    pub fn hash_values(&self, key: &[u8]) -> CResult<Vec<Vec<u8>>> {
        let (_, values) = self.hash_get_all(key)?;
        if values.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(values)
    }

    pub fn hash_str_len(&self, key: &[u8], field: &[u8]) -> CResult<usize> {
        Ok(self.hash_get(key, field)?.len())
    }

    pub fn hash_len(&self, key: &[u8]) -> CResult<usize> {
        Ok(self.hash_keys(key)?.len())
    }

    pub fn hash_m_set(&mut self, key: &[u8], args: &[Vec<u8>]) -> CResult<()> {
        if args.len() % 2 != 0 {
            return Err(Error::BadArgs);
        }
        for chunk in args.chunks_exact(2) {
            self.hash_set(key, &chunk[0], &chunk[1])?;
        }
        Ok(())
    }

    pub fn hash_m_get(&self, key: &[u8], fields: &[Vec<u8>]) -> CResult<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            match self.hash_get(key, field) {
                Ok(v) => out.push(Some(v)),
                Err(Error::NotFound) => out.push(None),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    // ---- set family ----

    pub fn set_add(&mut self, key: &[u8], members: &[Vec<u8>]) -> CResult<()> {
        self.check_writable()?;
        for member in members {
            let inner = encode_set_key(key, member);
            let pos = self.append_tx_record(DataType::Set, inner, member.clone(), false)?;
            self.sets.entry(key.to_vec()).or_default().insert(member.clone(), PendingWrite { tag: Tag::Normal, pos });
        }
        Ok(())
    }

    pub fn set_rem(&mut self, key: &[u8], members: &[Vec<u8>]) -> CResult<()> {
        self.check_writable()?;
        for member in members {
            if !self.set_is_member(key, member) {
                return Err(Error::NotFound);
            }
            let inner = encode_set_key(key, member);
            let pos = self.append_tx_record(DataType::Set, inner, Vec::new(), true)?;
            self.sets.entry(key.to_vec()).or_default().insert(member.clone(), PendingWrite { tag: Tag::Deleted, pos });
        }
        Ok(())
    }

    pub fn set_is_member(&self, key: &[u8], member: &[u8]) -> bool {
        if let Some(pw) = self.sets.get(key).and_then(|m| m.get(member)) {
            return pw.tag == Tag::Normal;
        }
        let member_key = set_member_index_key(member);
        self.db.index().set_index(key).map(|t| t.get(&member_key).is_some()).unwrap_or(false)
    }

    pub fn set_members(&self, key: &[u8]) -> CResult<Vec<Vec<u8>>> {
        let mut members = Vec::new();
        let pending = self.sets.get(key);
        let table = self.db.index().set_index(key);

        if let Some(table) = &table {
            let mut it = table.iterator(false);
            it.rewind();
            while it.valid() {
                if let Some(pos) = it.value() {
                    let value = self.db.read_value(pos)?;
                    if pending.map(|m| m.contains_key(&value)).unwrap_or(false) {
                        it.next();
                        continue;
                    }
                    members.push(value);
                }
                it.next();
            }
        }
        if let Some(pending) = pending {
            for (member, pw) in pending {
                if pw.tag == Tag::Normal {
                    members.push(member.clone());
                }
            }
        }
        if table.is_none() && pending.is_none() {
            return Err(Error::NotFound);
        }
        Ok(members)
    }

    pub fn set_card(&self, key: &[u8]) -> CResult<usize> {
        Ok(self.set_members(key)?.len())
    }

    // ---- list family ----

    fn list_meta(&self, key: &[u8]) -> CResult<(Rational, Rational)> {
        if let Some(pw) = self.list_meta.get(key) {
            return match pw.tag {
                Tag::Normal => {
                    let raw = self.db.read_value(pw.pos)?;
                    crate::codec::keys::decode_list_meta_value(&raw)
                }
                Tag::Deleted => Ok((Rational::integer(1), Rational::integer(0))),
            };
        }
        if let Some(pos) = self.db.index().list_meta_index().get(key) {
            let raw = self.db.read_value(pos)?;
            return crate::codec::keys::decode_list_meta_value(&raw);
        }
        Ok((Rational::integer(1), Rational::integer(0)))
    }

    fn write_list_meta(&mut self, key: &[u8], head: Rational, tail: Rational) -> CResult<()> {
        let is_empty = head.gt(&tail);
        let inner = encode_list_meta_key(key);
        if is_empty {
            let pos = self.append_tx_record(DataType::ListMeta, inner, Vec::new(), true)?;
            self.list_meta.insert(key.to_vec(), PendingWrite { tag: Tag::Deleted, pos });
        } else {
            let value = encode_list_meta_value(&head, &tail);
            let pos = self.append_tx_record(DataType::ListMeta, inner, value, false)?;
            self.list_meta.insert(key.to_vec(), PendingWrite { tag: Tag::Normal, pos });
        }
        Ok(())
    }

    fn list_data_get(&self, key: &[u8], seq: &Rational) -> CResult<Option<LogPos>> {
        let mut seq_bytes = Vec::new();
        seq.encode(&mut seq_bytes);
        if let Some(pw) = self.list_data.get(key).and_then(|m| m.get(&seq_bytes)) {
            return Ok(match pw.tag {
                Tag::Normal => Some(pw.pos),
                Tag::Deleted => None,
            });
        }
        Ok(self.db.index().list_data_index(key).and_then(|t| t.get(&seq_bytes)))
    }

    pub fn l_push(&mut self, key: &[u8], values: &[Vec<u8>]) -> CResult<()> {
        self.check_writable()?;
        let (mut head, tail) = self.list_meta(key)?;
        for value in values {
            let new_seq = head.sub_one();
            let prev = new_seq.sub_one();
            let next = head;
            let inner = encode_list_data_key(&new_seq, &prev, &next, key);
            let pos = self.append_tx_record(DataType::ListData, inner, value.clone(), false)?;
            let mut seq_bytes = Vec::new();
            new_seq.encode(&mut seq_bytes);
            self.list_data.entry(key.to_vec()).or_default().insert(seq_bytes, PendingWrite { tag: Tag::Normal, pos });
            head = new_seq;
        }
        self.write_list_meta(key, head, tail)
    }

    pub fn r_push(&mut self, key: &[u8], values: &[Vec<u8>]) -> CResult<()> {
        self.check_writable()?;
        let (head, mut tail) = self.list_meta(key)?;
        for value in values {
            let new_seq = tail.add_one();
            let prev = tail;
            let next = new_seq.add_one();
            let inner = encode_list_data_key(&new_seq, &prev, &next, key);
            let pos = self.append_tx_record(DataType::ListData, inner, value.clone(), false)?;
            let mut seq_bytes = Vec::new();
            new_seq.encode(&mut seq_bytes);
            self.list_data.entry(key.to_vec()).or_default().insert(seq_bytes, PendingWrite { tag: Tag::Normal, pos });
            tail = new_seq;
        }
        self.write_list_meta(key, head, tail)
    }

    pub fn l_pop(&mut self, key: &[u8]) -> CResult<Vec<u8>> {
        self.check_writable()?;
        let (head, tail) = self.list_meta(key)?;
        if head.gt(&tail) {
            return Err(Error::ListEmpty);
        }
        let pos = self.list_data_get(key, &head)?.ok_or(Error::ListEmpty)?;
        let record = self.db.read_record_at(pos)?;
        let value = record.value.clone();
        let (_, inner) = decode_tx_key(&record.key)?;
        let decoded = decode_list_data_key(inner)?;

        let mut seq_bytes = Vec::new();
        decoded.seq.encode(&mut seq_bytes);
        let del_inner = encode_list_data_key(&decoded.seq, &decoded.prev, &decoded.next, key);
        let del_pos = self.append_tx_record(DataType::ListData, del_inner, Vec::new(), true)?;
        self.list_data.entry(key.to_vec()).or_default().insert(seq_bytes, PendingWrite { tag: Tag::Deleted, pos: del_pos });

        self.write_list_meta(key, decoded.next, tail)?;
        Ok(value)
    }

    pub fn r_pop(&mut self, key: &[u8]) -> CResult<Vec<u8>> {
        self.check_writable()?;
        let (head, tail) = self.list_meta(key)?;
        if head.gt(&tail) {
            return Err(Error::ListEmpty);
        }
        let pos = self.list_data_get(key, &tail)?.ok_or(Error::ListEmpty)?;
        let record = self.db.read_record_at(pos)?;
        let value = record.value.clone();
        let (_, inner) = decode_tx_key(&record.key)?;
        let decoded = decode_list_data_key(inner)?;

        let mut seq_bytes = Vec::new();
        decoded.seq.encode(&mut seq_bytes);
        let del_inner = encode_list_data_key(&decoded.seq, &decoded.prev, &decoded.next, key);
        let del_pos = self.append_tx_record(DataType::ListData, del_inner, Vec::new(), true)?;
        self.list_data.entry(key.to_vec()).or_default().insert(seq_bytes, PendingWrite { tag: Tag::Deleted, pos: del_pos });

        self.write_list_meta(key, head, decoded.prev)?;
        Ok(value)
    }

    pub fn l_len(&self, key: &[u8]) -> CResult<usize> {
        let table = self.db.index().list_data_index(key);
        let pending = self.list_data.get(key);
        if table.is_none() && pending.is_none() {
            return Err(Error::NotFound);
        }
        let mut count = table.as_ref().map(|t| t.count()).unwrap_or(0) as i64;
        if let Some(pending) = pending {
            for (seq_bytes, pw) in pending {
                let existed = table.as_ref().map(|t| t.get(seq_bytes).is_some()).unwrap_or(false);
                match pw.tag {
                    Tag::Deleted => {
                        if existed {
                            count -= 1;
                        }
                    }
                    Tag::Normal => {
                        if !existed {
                            count += 1;
                        }
                    }
                }
            }
        }
        Ok(count.max(0) as usize)
    }
}

impl Drop for Transaction {
    /// A transaction dropped without an explicit `commit`/`rollback` is
    /// rolled back, so an early return via `?` in caller code never leaves
    /// a serializable lock held or data records orphaned without a commit marker.
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_inner();
        }
    }
}

//! Per-data-type index: a struct of typed accessors so transaction and
//! recovery code never peek inside (spec.md §4.5). Grounded on
//! `examples/original_source/index.go`'s `hashIndex`/`listIndex`/`index`
//! struct, extended with a set family the original's earliest `index.go`
//! predates (see `set_data.go`/`txnSet.go` for the per-outer-key pattern
//! applied here).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::codec::keys::{decode_hash_key, decode_list_data_key, decode_list_meta_key, decode_set_key, set_member_hash};
use crate::codec::record::DataType;
use crate::error::CResult;
use crate::meta::{new_memtable, MemTable};
use crate::options::IndexType;
use crate::segment::LogPos;

type FamilyMap = RwLock<HashMap<Vec<u8>, Arc<dyn MemTable>>>;

pub struct Index {
    index_type: IndexType,
    string_index: Arc<dyn MemTable>,
    hash_index: FamilyMap,
    set_index: FamilyMap,
    list_meta_index: Arc<dyn MemTable>,
    list_data_index: FamilyMap,
}

impl Index {
    pub fn new(index_type: IndexType) -> Self {
        Index {
            index_type,
            string_index: Arc::from(new_memtable(index_type)),
            hash_index: RwLock::new(HashMap::new()),
            set_index: RwLock::new(HashMap::new()),
            list_meta_index: Arc::from(new_memtable(index_type)),
            list_data_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn string_index(&self) -> Arc<dyn MemTable> {
        self.string_index.clone()
    }

    pub fn list_meta_index(&self) -> Arc<dyn MemTable> {
        self.list_meta_index.clone()
    }

    pub fn hash_index(&self, outer_key: &[u8]) -> Option<Arc<dyn MemTable>> {
        self.hash_index.read().unwrap().get(outer_key).cloned()
    }

    pub fn set_hash_index(&self, outer_key: &[u8]) -> Arc<dyn MemTable> {
        get_or_create(&self.hash_index, outer_key, self.index_type)
    }

    pub fn prune_hash_index(&self, outer_key: &[u8]) {
        prune_if_empty(&self.hash_index, outer_key);
    }

    pub fn set_index(&self, outer_key: &[u8]) -> Option<Arc<dyn MemTable>> {
        self.set_index.read().unwrap().get(outer_key).cloned()
    }

    pub fn set_set_index(&self, outer_key: &[u8]) -> Arc<dyn MemTable> {
        get_or_create(&self.set_index, outer_key, self.index_type)
    }

    pub fn prune_set_index(&self, outer_key: &[u8]) {
        prune_if_empty(&self.set_index, outer_key);
    }

    pub fn list_data_index(&self, outer_key: &[u8]) -> Option<Arc<dyn MemTable>> {
        self.list_data_index.read().unwrap().get(outer_key).cloned()
    }

    pub fn set_list_data_index(&self, outer_key: &[u8]) -> Arc<dyn MemTable> {
        get_or_create(&self.list_data_index, outer_key, self.index_type)
    }

    pub fn prune_list_data_index(&self, outer_key: &[u8]) {
        prune_if_empty(&self.list_data_index, outer_key);
    }

    /// Decodes an inner (post tx-id-split) log key per `data_type` and
    /// applies a put-or-delete to the right family memtable. Shared by
    /// recovery's non-transactional/committed-transaction replay and by
    /// merge's rewrite pass, so the composite-key dispatch logic lives in
    /// exactly one place (spec.md §4.9 step 4b / §4.10 step 4).
    pub fn apply_log_key(&self, data_type: DataType, inner_key: &[u8], deleted: bool, pos: LogPos) -> CResult<()> {
        match data_type {
            DataType::String => {
                if deleted {
                    self.string_index.delete(inner_key);
                } else {
                    self.string_index.put(inner_key, pos);
                }
            }
            DataType::Hash => {
                let (outer, field) = decode_hash_key(inner_key)?;
                let table = self.set_hash_index(outer);
                if deleted {
                    table.delete(field);
                    self.prune_hash_index(outer);
                } else {
                    table.put(field, pos);
                }
            }
            DataType::Set => {
                let (outer, member) = decode_set_key(inner_key)?;
                let table = self.set_set_index(outer);
                let member_key = set_member_hash(member).to_be_bytes();
                if deleted {
                    table.delete(&member_key);
                    self.prune_set_index(outer);
                } else {
                    table.put(&member_key, pos);
                }
            }
            DataType::ListMeta => {
                let outer = decode_list_meta_key(inner_key);
                if deleted {
                    self.list_meta_index.delete(outer);
                } else {
                    self.list_meta_index.put(outer, pos);
                }
            }
            DataType::ListData => {
                let decoded = decode_list_data_key(inner_key)?;
                let table = self.set_list_data_index(decoded.outer_key);
                let mut seq_bytes = Vec::new();
                decoded.seq.encode(&mut seq_bytes);
                if deleted {
                    table.delete(&seq_bytes);
                    self.prune_list_data_index(decoded.outer_key);
                } else {
                    table.put(&seq_bytes, pos);
                }
            }
        }
        Ok(())
    }

    /// Looks up the position a key currently maps to in its family index,
    /// without mutating anything. Used by merge to decide whether a record
    /// being rewritten is still the live copy of its key (spec.md §4.10
    /// step 3: "a record is live iff its position still matches the index").
    pub fn current_pos(&self, data_type: DataType, inner_key: &[u8]) -> CResult<Option<LogPos>> {
        let pos = match data_type {
            DataType::String => self.string_index.get(inner_key),
            DataType::Hash => {
                let (outer, field) = decode_hash_key(inner_key)?;
                self.hash_index(outer).and_then(|t| t.get(field))
            }
            DataType::Set => {
                let (outer, member) = decode_set_key(inner_key)?;
                let member_key = set_member_hash(member).to_be_bytes();
                self.set_index(outer).and_then(|t| t.get(&member_key))
            }
            DataType::ListMeta => {
                let outer = decode_list_meta_key(inner_key);
                self.list_meta_index.get(outer)
            }
            DataType::ListData => {
                let decoded = decode_list_data_key(inner_key)?;
                let mut seq_bytes = Vec::new();
                decoded.seq.encode(&mut seq_bytes);
                self.list_data_index(decoded.outer_key).and_then(|t| t.get(&seq_bytes))
            }
        };
        Ok(pos)
    }
}

/// The memtable key used to index a set member: the record's value carries
/// the raw member bytes (for `SMEMBERS`/`SCARD` enumeration), but the
/// memtable is keyed by its content hash per spec.md §3.
pub fn set_member_index_key(member: &[u8]) -> [u8; 4] {
    set_member_hash(member).to_be_bytes()
}

fn get_or_create(map: &FamilyMap, outer_key: &[u8], index_type: IndexType) -> Arc<dyn MemTable> {
    if let Some(table) = map.read().unwrap().get(outer_key) {
        return table.clone();
    }
    let mut guard = map.write().unwrap();
    guard.entry(outer_key.to_vec()).or_insert_with(|| Arc::from(new_memtable(index_type))).clone()
}

/// Pruning policy decision (spec.md §3 invariant, either policy acceptable):
/// an inner memtable that reaches zero entries is dropped rather than kept
/// around empty, matching the original's lazy-create-on-first-write pattern.
fn prune_if_empty(map: &FamilyMap, outer_key: &[u8]) {
    let should_remove = matches!(map.read().unwrap().get(outer_key), Some(t) if t.count() == 0);
    if should_remove {
        map.write().unwrap().remove(outer_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::LogPos;

    #[test]
    fn hash_index_lazy_create_and_prune() {
        let index = Index::new(IndexType::BTree);
        assert!(index.hash_index(b"outer").is_none());

        let table = index.set_hash_index(b"outer");
        table.put(b"field", LogPos { segment_id: 0, offset: 0 });
        assert!(index.hash_index(b"outer").is_some());

        table.delete(b"field");
        index.prune_hash_index(b"outer");
        assert!(index.hash_index(b"outer").is_none());
    }
}

//! Startup log replay: rebuilds every family index from the segment set,
//! honouring transaction boundaries and the optional merge hint file.
//! Grounded on `examples/original_source/db.go`'s `loadDataFile`/`loadIndex`
//! sequential-replay-with-in-flight-buffering pattern, generalized from its
//! string-only walk to all five data types via `Index::apply_log_key`.

use std::collections::HashMap;

use crate::codec::keys::{decode_tx_key, NO_TX_ID};
use crate::codec::record::{DataType, RecordType};
use crate::error::{CResult, Error};
use crate::index::Index;
use crate::segment::{LogPos, SegmentSet};
use crate::ttl;

/// Seeds the string family straight from a merge's hint file, short-
/// circuiting a full walk of the (now known-live) segments below the merge
/// boundary for that one family (spec.md §4.9 step 3).
pub(crate) fn seed_string_index_from_hint(index: &Index, hint_entries: &[(Vec<u8>, LogPos)]) {
    for (key, pos) in hint_entries {
        index.string_index().put(key, *pos);
    }
}

/// Replays every segment in ascending id order, applying committed
/// non-transactional and transactional writes to `index`. Transactional
/// records are buffered per tx-id until their commit/rollback marker is
/// seen; an unterminated transaction at the tail of the log (a crash mid-
/// transaction) is discarded, same as an explicit rollback. A CRC failure
/// while reading the *active* segment's tail truncates it there and ends
/// recovery; the same failure in any closed segment is fatal.
///
/// `merge_boundary` is the first non-merged segment id from a prior merge's
/// marker (0 if none), used to skip re-deriving the string family for
/// segments below it, since `hint_entries` already covers that work.
pub(crate) fn recover(segments: &mut SegmentSet, index: &Index, merge_boundary: u32) -> CResult<()> {
    let active_id = segments.active.id;
    let mut ids = segments.ordered_ids();
    ids.sort_unstable();

    let mut in_flight: HashMap<u64, Vec<(DataType, Vec<u8>, bool, LogPos)>> = HashMap::new();

    for id in ids {
        let mut offset = 0u64;
        loop {
            let is_active = id == active_id;
            let segment = if is_active { &mut segments.active } else { segments.closed.get_mut(&id).unwrap() };

            let outcome = segment.read_record(offset);
            let (record, len) = match outcome {
                Ok(Some(pair)) => pair,
                Ok(None) => break,
                Err(Error::CorruptRecord) if is_active => {
                    segment.truncate(offset)?;
                    break;
                }
                Err(e) => return Err(e),
            };

            let (tx_id, inner_key) = decode_tx_key(&record.key)?;
            let deleted = record.record_type == RecordType::Deleted;
            let pos = LogPos { segment_id: id, offset: offset as i64 };

            match record.record_type {
                RecordType::TxBegin => {
                    in_flight.entry(tx_id).or_default();
                }
                RecordType::TxRollback => {
                    in_flight.remove(&tx_id);
                }
                RecordType::TxCommit => {
                    if let Some(buffered) = in_flight.remove(&tx_id) {
                        for (data_type, inner, del, pos) in buffered {
                            apply_unless_hint_covered(index, data_type, &inner, del, pos, id, merge_boundary)?;
                        }
                    }
                }
                RecordType::Normal | RecordType::Deleted => {
                    if tx_id == NO_TX_ID {
                        apply_unless_hint_covered(index, record.data_type, inner_key, deleted, pos, id, merge_boundary)?;
                    } else {
                        in_flight.entry(tx_id).or_default().push((record.data_type, inner_key.to_vec(), deleted, pos));
                    }
                }
            }

            offset += len as u64;
        }
    }
    Ok(())
}

fn apply_unless_hint_covered(
    index: &Index,
    data_type: DataType,
    inner_key: &[u8],
    deleted: bool,
    pos: LogPos,
    segment_id: u32,
    merge_boundary: u32,
) -> CResult<()> {
    if data_type == DataType::String && segment_id < merge_boundary {
        return Ok(());
    }
    index.apply_log_key(data_type, inner_key, deleted, pos)
}

/// Walks the now-rebuilt string index looking for keys with a recorded
/// expiration. Already-expired keys are deleted immediately (tombstone
/// appended, index entry removed); the rest are returned so the caller can
/// hand them to the TTL scheduler (spec.md §4.9 step 6 / §4.2).
pub(crate) fn sweep_expired_and_collect_ttls(
    segments: &mut SegmentSet,
    index: &Index,
) -> CResult<Vec<(Vec<u8>, u64)>> {
    let table = index.string_index();
    let mut keys_with_pos = Vec::new();
    let mut it = table.iterator(false);
    it.rewind();
    while it.valid() {
        if let Some(pos) = it.value() {
            keys_with_pos.push((it.key().to_vec(), pos));
        }
        it.next();
    }
    it.close();

    let now = ttl::now_ns();
    let mut pending = Vec::new();
    for (key, pos) in keys_with_pos {
        let record = segments.read_at(pos)?;
        if record.expiration_ns == 0 {
            continue;
        }
        if record.expiration_ns <= now {
            let tombstone = crate::codec::record::LogRecord::new(
                RecordType::Deleted,
                DataType::String,
                crate::codec::keys::encode_tx_key(NO_TX_ID, &key),
                Vec::new(),
            );
            let (bytes, _) = tombstone.encode();
            segments.append(&bytes)?;
            table.delete(&key);
        } else {
            pending.push((key, record.expiration_ns));
        }
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::keys::encode_tx_key;
    use crate::codec::record::LogRecord;
    use crate::options::IndexType;
    use tempfile::tempdir;

    fn write_record(segments: &mut SegmentSet, record: &LogRecord) {
        let (bytes, _) = record.encode();
        segments.append(&bytes).unwrap();
    }

    #[test]
    fn replays_non_transactional_puts_and_deletes() {
        let dir = tempdir().unwrap();
        let mut segments = SegmentSet::open(dir.path(), 1024 * 1024).unwrap();

        write_record(
            &mut segments,
            &LogRecord::new(RecordType::Normal, DataType::String, encode_tx_key(NO_TX_ID, b"a"), b"1".to_vec()),
        );
        write_record(
            &mut segments,
            &LogRecord::new(RecordType::Normal, DataType::String, encode_tx_key(NO_TX_ID, b"b"), b"2".to_vec()),
        );
        write_record(
            &mut segments,
            &LogRecord::new(RecordType::Deleted, DataType::String, encode_tx_key(NO_TX_ID, b"a"), Vec::new()),
        );

        let index = Index::new(IndexType::BTree);
        recover(&mut segments, &index, 0).unwrap();

        assert!(index.string_index().get(b"a").is_none());
        assert!(index.string_index().get(b"b").is_some());
    }

    #[test]
    fn uncommitted_transaction_is_discarded_on_replay() {
        let dir = tempdir().unwrap();
        let mut segments = SegmentSet::open(dir.path(), 1024 * 1024).unwrap();

        let tx_id = 7u64;
        write_record(
            &mut segments,
            &LogRecord::new(
                RecordType::TxBegin,
                DataType::String,
                encode_tx_key(tx_id, crate::codec::record::sentinel::TX_BEGIN_KEY),
                Vec::new(),
            ),
        );
        write_record(
            &mut segments,
            &LogRecord::new(RecordType::Normal, DataType::String, encode_tx_key(tx_id, b"a"), b"1".to_vec()),
        );
        // No commit marker: simulates a crash mid-transaction.

        let index = Index::new(IndexType::BTree);
        recover(&mut segments, &index, 0).unwrap();

        assert!(index.string_index().get(b"a").is_none());
    }

    #[test]
    fn committed_transaction_is_applied_on_replay() {
        let dir = tempdir().unwrap();
        let mut segments = SegmentSet::open(dir.path(), 1024 * 1024).unwrap();

        let tx_id = 9u64;
        write_record(
            &mut segments,
            &LogRecord::new(
                RecordType::TxBegin,
                DataType::String,
                encode_tx_key(tx_id, crate::codec::record::sentinel::TX_BEGIN_KEY),
                Vec::new(),
            ),
        );
        write_record(
            &mut segments,
            &LogRecord::new(RecordType::Normal, DataType::String, encode_tx_key(tx_id, b"a"), b"1".to_vec()),
        );
        write_record(
            &mut segments,
            &LogRecord::new(
                RecordType::TxCommit,
                DataType::String,
                encode_tx_key(tx_id, crate::codec::record::sentinel::TX_COMMIT_KEY),
                Vec::new(),
            ),
        );

        let index = Index::new(IndexType::BTree);
        recover(&mut segments, &index, 0).unwrap();

        assert!(index.string_index().get(b"a").is_some());
    }
}

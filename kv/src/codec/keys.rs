//! Composite-key encode/decode: the varint tx-id prefix every on-disk key
//! carries, and the inner-key structure that varies per data type.

use crate::codec::varint::{decode_uvarint, encode_uvarint};
use crate::error::{CResult, Error};
use crate::mvcc::rational::Rational;

/// Reserved tx-id meaning "not part of a transaction".
pub const NO_TX_ID: u64 = 0;

/// Prepends `tx_id` (varint) to `inner_key`.
pub fn encode_tx_key(tx_id: u64, inner_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(inner_key.len() + 10);
    encode_uvarint(tx_id, &mut out);
    out.extend_from_slice(inner_key);
    out
}

/// Splits an on-disk key into (tx_id, inner_key).
pub fn decode_tx_key(key: &[u8]) -> CResult<(u64, &[u8])> {
    let (tx_id, n) = decode_uvarint(key)?;
    Ok((tx_id, &key[n..]))
}

/// `(outer_key_len, field_len, outer_key, field)`, both lengths varint.
pub fn encode_hash_key(outer_key: &[u8], field: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(outer_key.len() + field.len() + 8);
    encode_uvarint(outer_key.len() as u64, &mut out);
    encode_uvarint(field.len() as u64, &mut out);
    out.extend_from_slice(outer_key);
    out.extend_from_slice(field);
    out
}

pub fn decode_hash_key(inner: &[u8]) -> CResult<(&[u8], &[u8])> {
    let (outer_len, n1) = decode_uvarint(inner)?;
    let (field_len, n2) = decode_uvarint(&inner[n1..])?;
    let outer_start = n1 + n2;
    let field_start = outer_start + outer_len as usize;
    let field_end = field_start + field_len as usize;
    if field_end > inner.len() {
        return Err(Error::CorruptRecord);
    }
    Ok((&inner[outer_start..field_start], &inner[field_start..field_end]))
}

/// `(outer_key_len, member_len, outer_key, member)`, for the on-disk record.
pub fn encode_set_key(outer_key: &[u8], member: &[u8]) -> Vec<u8> {
    encode_hash_key(outer_key, member)
}

pub fn decode_set_key(inner: &[u8]) -> CResult<(&[u8], &[u8])> {
    decode_hash_key(inner)
}

/// Content hash used to index set members: spec.md says sets are
/// "content-hashed for indexing" rather than keyed by the raw member bytes.
/// CRC32 is already a dependency (the record codec's own checksum), so it
/// doubles as this hash rather than pulling in a second hashing crate.
pub fn set_member_hash(member: &[u8]) -> u32 {
    crc32fast::hash(member)
}

/// `(seq_len, prev_len, next_len, seq, prev, next, outer_key)`.
pub fn encode_list_data_key(seq: &Rational, prev: &Rational, next: &Rational, outer_key: &[u8]) -> Vec<u8> {
    let mut seq_bytes = Vec::new();
    seq.encode(&mut seq_bytes);
    let mut prev_bytes = Vec::new();
    prev.encode(&mut prev_bytes);
    let mut next_bytes = Vec::new();
    next.encode(&mut next_bytes);

    let mut out = Vec::with_capacity(seq_bytes.len() + prev_bytes.len() + next_bytes.len() + outer_key.len() + 6);
    encode_uvarint(seq_bytes.len() as u64, &mut out);
    encode_uvarint(prev_bytes.len() as u64, &mut out);
    encode_uvarint(next_bytes.len() as u64, &mut out);
    out.extend_from_slice(&seq_bytes);
    out.extend_from_slice(&prev_bytes);
    out.extend_from_slice(&next_bytes);
    out.extend_from_slice(outer_key);
    out
}

pub struct ListDataKey<'a> {
    pub seq: Rational,
    pub prev: Rational,
    pub next: Rational,
    pub outer_key: &'a [u8],
}

pub fn decode_list_data_key(inner: &[u8]) -> CResult<ListDataKey<'_>> {
    let (seq_len, n1) = decode_uvarint(inner)?;
    let (prev_len, n2) = decode_uvarint(&inner[n1..])?;
    let (next_len, n3) = decode_uvarint(&inner[n1 + n2..])?;
    let mut pos = n1 + n2 + n3;

    let (seq, used) = Rational::decode(&inner[pos..pos + seq_len as usize])?;
    if used != seq_len as usize {
        return Err(Error::CorruptRecord);
    }
    pos += seq_len as usize;

    let (prev, used) = Rational::decode(&inner[pos..pos + prev_len as usize])?;
    if used != prev_len as usize {
        return Err(Error::CorruptRecord);
    }
    pos += prev_len as usize;

    let (next, used) = Rational::decode(&inner[pos..pos + next_len as usize])?;
    if used != next_len as usize {
        return Err(Error::CorruptRecord);
    }
    pos += next_len as usize;

    if pos > inner.len() {
        return Err(Error::CorruptRecord);
    }
    Ok(ListDataKey { seq, prev, next, outer_key: &inner[pos..] })
}

/// list-meta inner keys are the bare outer key; no further structure.
/// Exposed as functions (rather than identity elsewhere) so call sites read
/// the same as the other data types' (en|de)code pair.
pub fn encode_list_meta_key(outer_key: &[u8]) -> Vec<u8> {
    outer_key.to_vec()
}

pub fn decode_list_meta_key(inner: &[u8]) -> &[u8] {
    inner
}

/// The list-meta record's value: `(head_seq, tail_seq)`.
pub fn encode_list_meta_value(head: &Rational, tail: &Rational) -> Vec<u8> {
    let mut out = Vec::new();
    head.encode(&mut out);
    tail.encode(&mut out);
    out
}

pub fn decode_list_meta_value(value: &[u8]) -> CResult<(Rational, Rational)> {
    let (head, n) = Rational::decode(value)?;
    let (tail, _) = Rational::decode(&value[n..])?;
    Ok((head, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_key_roundtrip() {
        let key = encode_tx_key(42, b"hello");
        let (tx_id, inner) = decode_tx_key(&key).unwrap();
        assert_eq!(tx_id, 42);
        assert_eq!(inner, b"hello");
    }

    #[test]
    fn hash_key_roundtrip() {
        let key = encode_hash_key(b"outer", b"field1");
        let (outer, field) = decode_hash_key(&key).unwrap();
        assert_eq!(outer, b"outer");
        assert_eq!(field, b"field1");
    }

    #[test]
    fn list_data_key_roundtrip() {
        let seq = Rational::integer(-3);
        let prev = Rational::integer(-4);
        let next = Rational::integer(1);
        let key = encode_list_data_key(&seq, &prev, &next, b"mylist");
        let decoded = decode_list_data_key(&key).unwrap();
        assert_eq!(decoded.seq, seq);
        assert_eq!(decoded.prev, prev);
        assert_eq!(decoded.next, next);
        assert_eq!(decoded.outer_key, b"mylist");
    }

    #[test]
    fn list_meta_value_roundtrip() {
        let head = Rational::integer(0);
        let tail = Rational::integer(1);
        let value = encode_list_meta_value(&head, &tail);
        let (h, t) = decode_list_meta_value(&value).unwrap();
        assert_eq!(h, head);
        assert_eq!(t, tail);
    }
}

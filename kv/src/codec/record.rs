//! The on-disk log record: a CRC-guarded header plus key and value bytes.
//!
//! ```text
//! offset 0  : u32 little-endian CRC32 over the rest
//! offset 4  : u8 record-type
//! offset 5  : u8 data-type
//! offset 6+ : varint key-len, varint value-len, varint expiration-ns
//!           : key bytes
//!           : value bytes
//! ```

use crate::codec::varint::{decode_uvarint, encode_uvarint, MAX_VARINT_LEN};
use crate::error::{CResult, Error};

/// Fixed prefix before the varint trio: 4 bytes CRC + 1 byte record-type + 1 byte data-type.
pub const FIXED_HEADER_LEN: usize = 6;

/// Conservative upper bound on the full header (fixed prefix + 3 varints), used to size
/// the read-ahead window before the real key/value lengths are known.
pub const MAX_HEADER_LEN: usize = FIXED_HEADER_LEN + 3 * MAX_VARINT_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    Normal = 0,
    Deleted = 1,
    TxCommit = 2,
    TxRollback = 3,
    TxBegin = 4,
}

impl RecordType {
    pub fn from_byte(b: u8) -> CResult<Self> {
        match b {
            0 => Ok(RecordType::Normal),
            1 => Ok(RecordType::Deleted),
            2 => Ok(RecordType::TxCommit),
            3 => Ok(RecordType::TxRollback),
            4 => Ok(RecordType::TxBegin),
            _ => Err(Error::CorruptRecord),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    String = 0,
    Hash = 1,
    ListData = 2,
    ListMeta = 3,
    Set = 4,
}

impl DataType {
    pub fn from_byte(b: u8) -> CResult<Self> {
        match b {
            0 => Ok(DataType::String),
            1 => Ok(DataType::Hash),
            2 => Ok(DataType::ListData),
            3 => Ok(DataType::ListMeta),
            4 => Ok(DataType::Set),
            _ => Err(Error::CorruptRecord),
        }
    }
}

/// Sentinel single-byte keys used for transaction markers and the merge-finished record.
pub mod sentinel {
    pub const TX_BEGIN_KEY: &[u8] = &[0x02];
    pub const TX_ROLLBACK_KEY: &[u8] = &[0x03];
    pub const TX_COMMIT_KEY: &[u8] = &[0x04];
    pub const MERGE_FINISHED_KEY: &[u8] = &[0x07];
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub record_type: RecordType,
    pub data_type: DataType,
    /// 0 means no expiration.
    pub expiration_ns: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl LogRecord {
    pub fn new(record_type: RecordType, data_type: DataType, key: Vec<u8>, value: Vec<u8>) -> Self {
        LogRecord { record_type, data_type, expiration_ns: 0, key, value }
    }

    pub fn with_expiration(mut self, expiration_ns: u64) -> Self {
        self.expiration_ns = expiration_ns;
        self
    }

    /// Encodes the record, backpatching the CRC. Returns the encoded bytes and their length.
    pub fn encode(&self) -> (Vec<u8>, usize) {
        let mut body = Vec::with_capacity(FIXED_HEADER_LEN + self.key.len() + self.value.len() + 16);
        // placeholder for the CRC, patched in below.
        body.extend_from_slice(&[0u8; 4]);
        body.push(self.record_type as u8);
        body.push(self.data_type as u8);
        encode_uvarint(self.key.len() as u64, &mut body);
        encode_uvarint(self.value.len() as u64, &mut body);
        encode_uvarint(self.expiration_ns, &mut body);
        body.extend_from_slice(&self.key);
        body.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&body[4..]);
        body[0..4].copy_from_slice(&crc.to_le_bytes());

        let len = body.len();
        (body, len)
    }
}

/// Parsed fixed-and-varint header, without key/value bytes.
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub crc: u32,
    pub record_type: RecordType,
    pub data_type: DataType,
    pub key_len: usize,
    pub value_len: usize,
    pub expiration_ns: u64,
}

/// Decodes the header from the front of `buf`. Returns `None` at a valid end-of-file marker
/// (fewer than the fixed prefix available, or the fixed prefix is all zero bytes).
pub fn decode_header(buf: &[u8]) -> CResult<Option<(Header, usize)>> {
    if buf.len() < FIXED_HEADER_LEN || buf[..FIXED_HEADER_LEN].iter().all(|&b| b == 0) {
        return Ok(None);
    }

    let crc = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let record_type = RecordType::from_byte(buf[4])?;
    let data_type = DataType::from_byte(buf[5])?;

    let rest = &buf[FIXED_HEADER_LEN..];
    let (key_len, n1) = decode_uvarint(rest)?;
    let (value_len, n2) = decode_uvarint(&rest[n1..])?;
    let (expiration_ns, n3) = decode_uvarint(&rest[n1 + n2..])?;

    let header = Header {
        crc,
        record_type,
        data_type,
        key_len: key_len as usize,
        value_len: value_len as usize,
        expiration_ns,
    };
    Ok(Some((header, FIXED_HEADER_LEN + n1 + n2 + n3)))
}

/// Recomputes the CRC over `header_bytes` (excluding the CRC field itself) ++ key ++ value
/// and compares it against `expected`.
pub fn verify_crc(expected: u32, header_bytes_sans_crc: &[u8], key: &[u8], value: &[u8]) -> bool {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_bytes_sans_crc);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize() == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let record = LogRecord::new(
            RecordType::Normal,
            DataType::String,
            b"hello".to_vec(),
            b"world".to_vec(),
        )
        .with_expiration(123456789);

        let (bytes, len) = record.encode();
        assert_eq!(len, bytes.len());

        let (header, header_len) = decode_header(&bytes).unwrap().unwrap();
        assert_eq!(header.record_type, RecordType::Normal);
        assert_eq!(header.data_type, DataType::String);
        assert_eq!(header.key_len, 5);
        assert_eq!(header.value_len, 5);
        assert_eq!(header.expiration_ns, 123456789);

        let key = &bytes[header_len..header_len + header.key_len];
        let value = &bytes[header_len + header.key_len..header_len + header.key_len + header.value_len];
        assert_eq!(key, b"hello");
        assert_eq!(value, b"world");
        assert!(verify_crc(header.crc, &bytes[4..header_len], key, value));
    }

    #[test]
    fn all_zero_header_is_eof() {
        let buf = [0u8; FIXED_HEADER_LEN];
        assert!(decode_header(&buf).unwrap().is_none());
    }

    #[test]
    fn short_buffer_is_eof() {
        let buf = [1u8, 2, 3];
        assert!(decode_header(&buf).unwrap().is_none());
    }

    #[test]
    fn corrupted_byte_fails_crc() {
        let record = LogRecord::new(RecordType::Normal, DataType::String, b"k".to_vec(), b"v".to_vec());
        let (mut bytes, _) = record.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let (header, header_len) = decode_header(&bytes).unwrap().unwrap();
        let key = &bytes[header_len..header_len + header.key_len];
        let value = &bytes[header_len + header.key_len..];
        assert!(!verify_crc(header.crc, &bytes[4..header_len], key, value));
    }
}

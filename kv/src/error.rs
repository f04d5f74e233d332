use std::fmt::{Display, Formatter};

/// Crate-wide result alias, used throughout in place of a bare `Result`.
pub type CResult<T> = Result<T, Error>;

/// Crate-wide error type.
///
/// Variants roughly fall into the taxonomy spec'd for the boundary: user-input
/// errors, state errors, concurrency errors, resource errors, and data-integrity
/// errors. They're kept flat rather than nested because callers match on them
/// directly.
#[derive(Debug)]
pub enum Error {
    /// The key was empty where a non-empty key is required.
    KeyEmpty,
    /// The key contained a control character.
    KeyIsControlChar,
    /// A write succeeded on the log but the in-memory index could not be updated.
    UpdateIndexFailed,
    /// No value exists for the given key (or field/member).
    NotFound,
    /// A merge is already in progress.
    InMerge,
    /// The data directory is locked by another process.
    DirectoryOccupied,
    /// A log record's CRC did not match its bytes.
    CorruptRecord,
    /// An MVCC transaction lost a write-write conflict.
    Conflict,
    /// An operation was attempted on an empty heap (e.g. the oracle's active-tx heap).
    HeapEmpty,
    /// A transaction function was not supplied.
    EmptyTxnFunction,
    /// A write was attempted on a read-only transaction.
    ReadOnly,
    /// Arguments to a variadic operation were malformed (e.g. odd-length MSET pairs).
    BadArgs,
    /// A list operation was attempted on an empty list.
    ListEmpty,
    /// SETNX-style operation found the key already present.
    KeyExists,
    /// INCR/DECR found a value that doesn't parse as a base-10 integer.
    NotAnInteger,
    /// Generic internal error, carrying a message (matches the teacher's own catch-all).
    Internal(String),
    /// Errors from the encoding layer (codec, varint).
    Encoding(String),
    /// Wrapped I/O error.
    Io(std::io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::KeyEmpty => write!(f, "the key is empty"),
            Error::KeyIsControlChar => write!(f, "the key contains a control character"),
            Error::UpdateIndexFailed => write!(f, "update index failed"),
            Error::NotFound => write!(f, "the key was not found"),
            Error::InMerge => write!(f, "a merge is already in progress"),
            Error::DirectoryOccupied => write!(f, "the data directory is held by another process"),
            Error::CorruptRecord => write!(f, "log record failed crc validation"),
            Error::Conflict => write!(f, "transaction conflict, please retry"),
            Error::HeapEmpty => write!(f, "heap is empty"),
            Error::EmptyTxnFunction => write!(f, "no transaction function was supplied"),
            Error::ReadOnly => write!(f, "cannot write in a read-only transaction"),
            Error::BadArgs => write!(f, "bad arguments"),
            Error::ListEmpty => write!(f, "the list is empty"),
            Error::KeyExists => write!(f, "the key already exists"),
            Error::NotAnInteger => write!(f, "value is not an integer"),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
            Error::Encoding(msg) => write!(f, "encoding error: {}", msg),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Error::KeyEmpty, Error::KeyEmpty)
                | (Error::KeyIsControlChar, Error::KeyIsControlChar)
                | (Error::UpdateIndexFailed, Error::UpdateIndexFailed)
                | (Error::NotFound, Error::NotFound)
                | (Error::InMerge, Error::InMerge)
                | (Error::DirectoryOccupied, Error::DirectoryOccupied)
                | (Error::CorruptRecord, Error::CorruptRecord)
                | (Error::Conflict, Error::Conflict)
                | (Error::HeapEmpty, Error::HeapEmpty)
                | (Error::EmptyTxnFunction, Error::EmptyTxnFunction)
                | (Error::ReadOnly, Error::ReadOnly)
                | (Error::BadArgs, Error::BadArgs)
                | (Error::ListEmpty, Error::ListEmpty)
                | (Error::KeyExists, Error::KeyExists)
                | (Error::NotAnInteger, Error::NotAnInteger)
        )
    }
}

//! `kv` is an embeddable key-value store built on an append-only log:
//! writes land in a segment file and an in-memory index maps each key to
//! its position, so reads never touch the log except to fetch the value
//! itself. Deletes append a tombstone; `Database::merge` compacts old
//! segments by rewriting their live records into a fresh one.
//!
//! On top of the plain string store it layers Redis-style hash, set, and
//! list data types, per-key TTL, MVCC transactions with a choice of
//! isolation level, and a watch mechanism for key change notifications.
//!
//! ## Getting started
//!
//! ```no_run
//! use kv::{Database, Options};
//!
//! let mut options = Options::default();
//! options.dir_path = "/tmp/kv-example".into();
//! let db = Database::open(options).unwrap();
//!
//! db.put(b"a", b"1").unwrap();
//! assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());
//! db.del(b"a").unwrap();
//!
//! db.close().unwrap();
//! ```

pub mod batch;
pub mod codec;
pub mod db;
pub mod error;
pub mod index;
pub mod io;
pub mod merge;
pub mod meta;
pub mod mvcc;
pub mod options;
pub mod segment;
pub mod ttl;
pub mod watch;

pub use batch::WriteBatch;
pub use db::Database;
pub use error::{CResult, Error};
pub use mvcc::{IsolationLevel, Transaction};
pub use options::{IndexType, Options};

//! MVCC transaction manager: the oracle (timestamp allocation + conflict
//! detection) and the per-transaction pending-write buffers it arbitrates
//! between. Grounded on `examples/original_source/txn.go`.

pub mod oracle;
pub mod rational;
pub mod transaction;

pub use oracle::Oracle;
pub use transaction::{IsolationLevel, Transaction};

pub mod reader;
pub mod writer;

use crate::error::CResult;

/// The capability set a segment's storage driver must provide, split across
/// a write-only append driver and a read-only mmap driver (spec.md §4.2: hot
/// reads avoid a syscall per value, writes go through a buffered appender).
pub trait Driver {
    fn read(&self, buf: &mut [u8], offset: u64) -> CResult<usize>;
    fn write(&mut self, buf: &[u8]) -> CResult<usize>;
    fn sync(&mut self) -> CResult<()>;
    fn size(&self) -> CResult<u64>;
}

pub use reader::MmapReader;
pub use writer::AppendWriter;

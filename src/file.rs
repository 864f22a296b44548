use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use crate::error::Result;

/// Random-access backing file: positional reads, positional writes, and a
/// size probe. No seek state is used or assumed, so one handle can serve
/// a store and all of its snapshots.
pub trait ReadWriteAt: Send + Sync {
    /// Fills `buf` from the file starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Writes all of `buf` to the file starting at `offset`.
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()>;

    /// Returns the current file size in bytes.
    fn size(&self) -> Result<i64>;
}

impl ReadWriteAt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        Ok(self.read_exact_at(buf, offset)?)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        Ok(self.write_all_at(buf, offset)?)
    }

    fn size(&self) -> Result<i64> {
        Ok(self.metadata()?.len() as i64)
    }
}

/// A backing file handle shared between a store and its snapshots. The
/// file itself is owned by the caller; the store only borrows it.
pub type SharedFile = Arc<dyn ReadWriteAt>;

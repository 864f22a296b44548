use std::sync::atomic::{AtomicI64, Ordering};

use crate::encoding::PLoc;
use crate::error::{Error, Result};
use crate::file::SharedFile;

/// State shared between a store, its collections, and its snapshots: the
/// backing file, the append cursor, and the read-only flag.
///
/// The cursor is the logical end of the append-only data described by the
/// in-memory structure. It only ever advances, after each successful
/// write; interrupted flushes leave unreferenced bytes behind rather than
/// corrupting earlier records.
pub(crate) struct StoreState {
    pub(crate) file: Option<SharedFile>,
    size: AtomicI64,
    pub(crate) read_only: bool,
}

impl StoreState {
    /// State for a memory-only store: no file, nothing to flush.
    pub(crate) fn memory_only() -> Self {
        StoreState {
            file: None,
            size: AtomicI64::new(0),
            read_only: false,
        }
    }

    pub(crate) fn with_file(file: SharedFile, size: i64, read_only: bool) -> Self {
        StoreState {
            file: Some(file),
            size: AtomicI64::new(size),
            read_only,
        }
    }

    /// State for a read-only snapshot: the same file handle, the cursor
    /// captured as of now.
    pub(crate) fn snapshot(&self) -> Self {
        StoreState {
            file: self.file.clone(),
            size: AtomicI64::new(self.size()),
            read_only: true,
        }
    }

    fn file(&self) -> Result<&SharedFile> {
        self.file.as_ref().ok_or(Error::MemoryOnly)
    }

    pub(crate) fn size(&self) -> i64 {
        self.size.load(Ordering::SeqCst)
    }

    /// Moves the cursor to the end of a recovered root record, reclaiming
    /// any trailing junk for the next append.
    pub(crate) fn set_size(&self, size: i64) {
        self.size.store(size, Ordering::SeqCst);
    }

    /// Appends a record at the cursor and returns its location. The
    /// writer is exclusive, so load-then-store on the cursor is safe.
    pub(crate) fn append(&self, buf: &[u8]) -> Result<PLoc> {
        let file = self.file()?;
        let offset = self.size.load(Ordering::SeqCst);
        file.write_at(buf, offset as u64)?;
        self.size.store(offset + buf.len() as i64, Ordering::SeqCst);
        Ok(PLoc::new(offset, buf.len() as u32))
    }

    /// Reads the full byte range of a persisted record.
    pub(crate) fn read_record(&self, loc: PLoc) -> Result<Vec<u8>> {
        let file = self.file()?;
        let mut buf = vec![0u8; loc.length as usize];
        file.read_at(&mut buf, loc.offset as u64)?;
        Ok(buf)
    }
}

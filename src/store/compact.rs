use crate::error::Result;
use crate::file::SharedFile;

use super::Store;

impl Store {
    /// Copies all live data into a fresh store backed by `file`,
    /// rewriting every item in ascending key order. The destination file
    /// ends up without the unreferenced bytes that append-only flushing
    /// accumulates in the source.
    ///
    /// With `flush_every > 0` the destination is flushed every that many
    /// items, bounding memory for large stores. It is always flushed once
    /// at the end.
    pub fn copy_to(&self, file: SharedFile, flush_every: usize) -> Result<Store> {
        let dst = Store::open(file)?;
        for name in self.get_collection_names() {
            let Some(src) = self.get_collection(&name) else {
                continue;
            };
            let dst_coll = dst.set_collection(&name, Some(src.compare()));
            let Some(min) = src.min_item(false)? else {
                continue;
            };
            let mut copied = 0usize;
            let mut failed = None;
            src.visit_items_ascend(&min.key, true, |item| {
                let result = dst_coll.set_item(item.clone()).and_then(|()| {
                    copied += 1;
                    if flush_every > 0 && copied % flush_every == 0 {
                        dst.flush()
                    } else {
                        Ok(())
                    }
                });
                match result {
                    Ok(()) => true,
                    Err(err) => {
                        failed = Some(err);
                        false
                    }
                }
            })?;
            if let Some(err) = failed {
                return Err(err);
            }
            tracing::debug!(collection = %name, items = copied, "copied collection");
        }
        dst.flush()?;
        Ok(dst)
    }
}

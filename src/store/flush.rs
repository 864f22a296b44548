use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::treap::NodeRef;

use super::recovery;
use super::state::StoreState;
use super::Store;

impl Store {
    /// Appends all unpersisted items and nodes, then a fresh root record.
    ///
    /// Flushing after every mutation trades throughput for a smaller
    /// window of data loss; batching many `set`/`delete` calls per flush
    /// is the higher-performance choice. Durability against crashes also
    /// needs the caller to sync the file; the store never does.
    pub fn flush(&self) -> Result<()> {
        if self.state().read_only {
            return Err(Error::ReadOnly);
        }
        if self.state().file.is_none() {
            return Err(Error::MemoryOnly);
        }
        let collections = self.collections();
        let mut sorted: Vec<_> = collections.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut roots = BTreeMap::new();
        for (name, coll) in sorted {
            let root = coll.root();
            flush_items(self.state(), &root)?;
            flush_nodes(self.state(), &root)?;
            roots.insert(name.clone(), root.loc().unwrap_or_default());
        }
        recovery::write_roots(self.state(), &roots)?;
        tracing::debug!(
            collections = roots.len(),
            size = self.state().size(),
            "flushed store"
        );
        Ok(())
    }
}

/// In-order walk appending dirty items, so items land in key order. A
/// subtree that already has a location is clean and is skipped whole.
fn flush_items(state: &StoreState, n: &NodeRef) -> Result<()> {
    if n.loc().is_some() {
        return Ok(());
    }
    let Some(node) = n.mem() else {
        return Ok(());
    };
    flush_items(state, &node.left)?;
    node.item.flush(state)?;
    flush_items(state, &node.right)
}

/// Post-order walk appending dirty nodes children-first, so a parent's
/// record always refers to already-persisted children.
fn flush_nodes(state: &StoreState, n: &NodeRef) -> Result<()> {
    if n.loc().is_some() {
        return Ok(());
    }
    let Some(node) = n.mem() else {
        return Ok(());
    };
    flush_nodes(state, &node.left)?;
    flush_nodes(state, &node.right)?;
    n.write(state)
}

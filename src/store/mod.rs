//! A persistable store holding collections of ordered keys and values.
//!
//! Persistence is append-only over immutable copy-on-write treaps. The
//! store is single-writer: callers serialize mutations. Reads may run
//! concurrently; the snapshot pattern gives them a stable view.

pub(crate) mod state;

mod collection;
mod compact;
mod flush;
mod recovery;

pub use collection::Collection;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::file::SharedFile;
use crate::treap::{bytes_compare, KeyCompare, NodeRef};

use state::StoreState;

/// Current on-disk format version. Version mismatches are fatal at open.
pub const VERSION: u32 = 3;

type CollectionMap = HashMap<String, Arc<Collection>>;

/// A store: a named set of collections persisted to a single append-only
/// file, or held purely in memory.
pub struct Store {
    state: Arc<StoreState>,
    // The collection map is published as an immutable value: writers
    // build a new map and swap the pointer, readers clone it out.
    collections: RwLock<Arc<CollectionMap>>,
}

impl Store {
    /// Opens a memory-only store. It behaves like a file-backed store
    /// except that [`Store::flush`] fails.
    pub fn open_memory() -> Store {
        Store {
            state: Arc::new(StoreState::memory_only()),
            collections: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Opens a store backed by `file`, recovering the most recent
    /// complete root record if the file is non-empty. The file handle is
    /// owned by the caller; the store only borrows it.
    ///
    /// Comparators are not persisted: every recovered collection compares
    /// byte-lexicographically. A caller that used a custom ordering MUST
    /// re-install it with [`Store::set_collection`] before issuing any
    /// key operation on the reopened collection.
    pub fn open(file: SharedFile) -> Result<Store> {
        let size = file.size()?;
        let state = Arc::new(StoreState::with_file(file, size, false));
        let mut map = HashMap::new();
        if size > 0 {
            for (name, loc) in recovery::read_roots(&state)? {
                let coll = Collection::with_root(
                    name.clone(),
                    state.clone(),
                    bytes_compare(),
                    NodeRef::from_loc(loc),
                );
                map.insert(name, coll);
            }
            tracing::info!(
                collections = map.len(),
                size = state.size(),
                "recovered store roots"
            );
        }
        Ok(Store {
            state,
            collections: RwLock::new(Arc::new(map)),
        })
    }

    pub(crate) fn state(&self) -> &Arc<StoreState> {
        &self.state
    }

    pub(crate) fn collections(&self) -> Arc<CollectionMap> {
        self.collections.read().unwrap().clone()
    }

    /// Creates a named collection, or replaces the comparator of an
    /// existing one. `None` means byte-lexicographic ordering.
    ///
    /// Comparators are never persisted; see [`Store::open`]. Removing and
    /// re-creating a collection is the fast way to empty it.
    pub fn set_collection(&self, name: &str, compare: Option<KeyCompare>) -> Arc<Collection> {
        let compare = compare.unwrap_or_else(bytes_compare);
        let mut collections = self.collections.write().unwrap();
        if let Some(coll) = collections.get(name) {
            coll.set_compare(compare);
            return coll.clone();
        }
        let coll = Collection::new(name.to_string(), self.state.clone(), compare);
        let mut map = (**collections).clone();
        map.insert(name.to_string(), coll.clone());
        *collections = Arc::new(map);
        coll
    }

    /// Retrieves a named collection.
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections().get(name).cloned()
    }

    /// Returns all collection names in sorted order.
    pub fn get_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections().keys().cloned().collect();
        names.sort();
        names
    }

    /// Removes a named collection. The removal is not reflected in
    /// persistence until the next [`Store::flush`].
    pub fn remove_collection(&self, name: &str) {
        let mut collections = self.collections.write().unwrap();
        if !collections.contains_key(name) {
            return;
        }
        let mut map = (**collections).clone();
        map.remove(name);
        *collections = Arc::new(map);
    }

    /// Produces a read-only snapshot sharing the backing file and the
    /// in-memory record graph with this store. Later mutations on the
    /// original never show through the snapshot, because every treap
    /// operation is copy-on-write.
    ///
    /// A snapshot and its original share the record graph, so `set` and
    /// `delete` on the original must not run concurrently with snapshot
    /// reads of the same collection; the single-writer contract covers
    /// both stores together.
    pub fn snapshot(&self) -> Store {
        let collections = self.collections();
        let state = Arc::new(self.state.snapshot());
        let map = collections
            .iter()
            .map(|(name, coll)| (name.clone(), coll.duplicate(state.clone())))
            .collect();
        Store {
            state,
            collections: RwLock::new(Arc::new(map)),
        }
    }
}

use std::sync::{Arc, RwLock};

use crate::errinput;
use crate::error::Result;
use crate::treap::{self, Item, ItemRef, KeyCompare, Node, NodeRef};

use super::state::StoreState;

/// A persistable collection of ordered key-value items, backed by an
/// immutable copy-on-write treap.
///
/// Mutations (`set`, `set_item`, `delete`) must be serialized by the
/// caller; reads may run concurrently with each other and, under the
/// snapshot pattern, with a writer.
pub struct Collection {
    name: String,
    state: Arc<StoreState>,
    compare: RwLock<KeyCompare>,
    root: RwLock<NodeRef>,
}

impl Collection {
    pub(crate) fn new(name: String, state: Arc<StoreState>, compare: KeyCompare) -> Arc<Self> {
        Self::with_root(name, state, compare, NodeRef::empty())
    }

    pub(crate) fn with_root(
        name: String,
        state: Arc<StoreState>,
        compare: KeyCompare,
        root: NodeRef,
    ) -> Arc<Self> {
        Arc::new(Collection {
            name,
            state,
            compare: RwLock::new(compare),
            root: RwLock::new(root),
        })
    }

    /// Duplicates this collection against a snapshot's state, sharing the
    /// root treap with the original.
    pub(crate) fn duplicate(&self, state: Arc<StoreState>) -> Arc<Self> {
        Self::with_root(self.name.clone(), state, self.compare(), self.root())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn compare(&self) -> KeyCompare {
        self.compare.read().unwrap().clone()
    }

    pub(crate) fn set_compare(&self, compare: KeyCompare) {
        *self.compare.write().unwrap() = compare;
    }

    pub(crate) fn root(&self) -> NodeRef {
        self.root.read().unwrap().clone()
    }

    fn set_root(&self, root: NodeRef) {
        *self.root.write().unwrap() = root;
    }

    /// Inserts or replaces the item for `key`, drawing a random balancing
    /// priority. Values may be empty; keys must be 1..=65535 bytes.
    pub fn set(&self, key: &[u8], val: &[u8]) -> Result<()> {
        self.set_item(Item::new(key.to_vec(), val.to_vec(), rand::random()))
    }

    /// Inserts or replaces an item with a caller-supplied priority. The
    /// new item wins over any existing item with the same key.
    pub fn set_item(&self, item: Item) -> Result<()> {
        Item::check_key(&item.key)?;
        if item.val.is_none() {
            return Err(errinput!("cannot set an item with an unfetched value"));
        }
        let single = NodeRef::from_node(Node::new(
            ItemRef::from_item(item),
            NodeRef::empty(),
            NodeRef::empty(),
        ));
        let root = treap::union(&self.state, &self.compare(), &self.root(), &single)?;
        self.set_root(root);
        Ok(())
    }

    /// Deletes the item for `key`, if present.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let compare = self.compare();
        let (left, _, right) = treap::split(&self.state, &compare, &self.root(), key)?;
        let root = treap::join(&self.state, &left, &right)?;
        self.set_root(root);
        Ok(())
    }

    /// Retrieves the value for `key`, loading it from disk if needed.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_item(key, true)?.and_then(|item| item.val))
    }

    /// Retrieves the item for `key`. With `with_value` false the value
    /// slot may be left unfetched, saving I/O for large values.
    pub fn get_item(&self, key: &[u8], with_value: bool) -> Result<Option<Item>> {
        let found = treap::lookup(&self.state, &self.compare(), &self.root(), key, with_value)?;
        Ok(found.map(|item| (*item).clone()))
    }

    /// Retrieves the item with the smallest key, or None if empty.
    pub fn min_item(&self, with_value: bool) -> Result<Option<Item>> {
        let found = treap::edge(&self.state, &self.root(), with_value, |n| &n.left)?;
        Ok(found.map(|item| (*item).clone()))
    }

    /// Retrieves the item with the largest key, or None if empty.
    pub fn max_item(&self, with_value: bool) -> Result<Option<Item>> {
        let found = treap::edge(&self.state, &self.root(), with_value, |n| &n.right)?;
        Ok(found.map(|item| (*item).clone()))
    }

    /// Visits items with key >= `target` in ascending key order until the
    /// visitor returns false or the items run out.
    pub fn visit_items_ascend<F>(&self, target: &[u8], with_value: bool, mut visitor: F) -> Result<()>
    where
        F: FnMut(&Item) -> bool,
    {
        treap::visit_ascend(
            &self.state,
            &self.compare(),
            &self.root(),
            target,
            with_value,
            &mut visitor,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treap::bytes_compare;

    fn collection() -> Arc<Collection> {
        Collection::new(
            "test".to_string(),
            Arc::new(StoreState::memory_only()),
            bytes_compare(),
        )
    }

    #[test]
    fn test_set_get_delete() {
        let coll = collection();
        assert_eq!(coll.get(b"a").expect("Failed to get"), None);

        coll.set(b"a", b"1").expect("Failed to set");
        coll.set(b"b", b"2").expect("Failed to set");
        assert_eq!(coll.get(b"a").expect("Failed to get"), Some(b"1".to_vec()));
        assert_eq!(coll.get(b"b").expect("Failed to get"), Some(b"2".to_vec()));

        coll.set(b"a", b"updated").expect("Failed to set");
        assert_eq!(
            coll.get(b"a").expect("Failed to get"),
            Some(b"updated".to_vec())
        );

        coll.delete(b"a").expect("Failed to delete");
        assert_eq!(coll.get(b"a").expect("Failed to get"), None);
        assert_eq!(coll.get(b"b").expect("Failed to get"), Some(b"2".to_vec()));

        // Deleting an absent key is a no-op.
        coll.delete(b"zz").expect("Failed to delete");
        assert_eq!(coll.get(b"b").expect("Failed to get"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_key_validation() {
        let coll = collection();
        assert!(coll.set(b"", b"v").is_err());
        assert!(coll.set(&vec![0u8; 65536], b"v").is_err());
        assert!(coll.set(&vec![0u8; 65535], b"v").is_ok());
        assert!(coll.set(b"k", b"").is_ok());

        let unfetched = Item {
            key: b"k".to_vec(),
            val: None,
            priority: 0,
        };
        assert!(coll.set_item(unfetched).is_err());
    }

    #[test]
    fn test_min_max() {
        let coll = collection();
        assert!(coll.min_item(true).expect("Failed to get min").is_none());
        assert!(coll.max_item(true).expect("Failed to get max").is_none());

        coll.set(b"b", b"2").expect("Failed to set");
        let min = coll.min_item(true).expect("Failed to get min").expect("Min missing");
        let max = coll.max_item(true).expect("Failed to get max").expect("Max missing");
        assert_eq!(min.key, max.key);

        coll.set(b"a", b"1").expect("Failed to set");
        coll.set(b"c", b"3").expect("Failed to set");
        let min = coll.min_item(true).expect("Failed to get min").expect("Min missing");
        assert_eq!(min.key, b"a");
        assert_eq!(min.val.as_deref(), Some(b"1".as_slice()));
        let max = coll.max_item(true).expect("Failed to get max").expect("Max missing");
        assert_eq!(max.key, b"c");

        // Deleting the only item empties the treap again.
        let coll = collection();
        coll.set(b"only", b"1").expect("Failed to set");
        coll.delete(b"only").expect("Failed to delete");
        assert!(coll.min_item(true).expect("Failed to get min").is_none());
    }

    #[test]
    fn test_visit_items_ascend() {
        let coll = collection();
        let mut visited = 0;
        coll.visit_items_ascend(b"", true, |_| {
            visited += 1;
            true
        })
        .expect("Failed to visit");
        assert_eq!(visited, 0);

        coll.set(b"a", b"1").expect("Failed to set");
        coll.set(b"b", b"2").expect("Failed to set");
        coll.set(b"c", b"3").expect("Failed to set");

        let mut seen = Vec::new();
        coll.visit_items_ascend(b"b", true, |item| {
            seen.push((item.key.clone(), item.val.clone().unwrap()));
            true
        })
        .expect("Failed to visit");
        assert_eq!(
            seen,
            vec![(b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]
        );
    }

    #[test]
    fn test_get_item_without_value() {
        let coll = collection();
        coll.set(b"k", b"big value").expect("Failed to set");
        let item = coll
            .get_item(b"k", false)
            .expect("Failed to get item")
            .expect("Item missing");
        assert_eq!(item.key, b"k");
        // In-memory items keep their value; the contract only promises the
        // key is present.
        let item = coll
            .get_item(b"k", true)
            .expect("Failed to get item")
            .expect("Item missing");
        assert_eq!(item.val.as_deref(), Some(b"big value".as_slice()));
    }

    #[test]
    fn test_custom_comparator() {
        let reversed: KeyCompare = Arc::new(|a: &[u8], b: &[u8]| b.cmp(a));
        let coll = Collection::new(
            "reversed".to_string(),
            Arc::new(StoreState::memory_only()),
            reversed,
        );
        coll.set(b"a", b"1").expect("Failed to set");
        coll.set(b"b", b"2").expect("Failed to set");
        coll.set(b"c", b"3").expect("Failed to set");

        // Under a reversed comparator the minimum is the largest byte key.
        let min = coll.min_item(false).expect("Failed to get min").expect("Min missing");
        assert_eq!(min.key, b"c");

        let mut seen = Vec::new();
        coll.visit_items_ascend(b"c", false, |item| {
            seen.push(item.key.clone());
            true
        })
        .expect("Failed to visit");
        assert_eq!(seen, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_thousand_items_delete_evens() {
        let coll = collection();
        for i in 0..1000 {
            let key = format!("key{i:04}");
            coll.set(key.as_bytes(), key.as_bytes()).expect("Failed to set");
        }
        for i in (0..1000).step_by(2) {
            let key = format!("key{i:04}");
            coll.delete(key.as_bytes()).expect("Failed to delete");
        }

        let mut seen = Vec::new();
        coll.visit_items_ascend(b"", false, |item| {
            seen.push(item.key.clone());
            true
        })
        .expect("Failed to visit");
        assert_eq!(seen.len(), 500);
        for (i, key) in seen.iter().enumerate() {
            let expected = format!("key{:04}", 2 * i + 1);
            assert_eq!(key, expected.as_bytes());
        }
    }
}

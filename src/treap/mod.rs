//! Immutable copy-on-write treap operations.
//!
//! All operations are pure on their NodeRef inputs: they never mutate the
//! trees passed in, and the result structurally shares unaffected
//! subtrees with the inputs. A result subtree equal to an input subtree
//! is returned by reference, not copied.

mod item;
mod node;

pub use item::{Item, ITEM_HEADER_SIZE, MAX_KEY_LEN};
pub(crate) use item::ItemRef;
pub use node::NODE_SIZE;
pub(crate) use node::{Node, NodeRef};

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::store::state::StoreState;

/// A total order over keys. Collections default to byte-lexicographic
/// comparison.
pub type KeyCompare = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// The default byte-lexicographic comparator.
pub fn bytes_compare() -> KeyCompare {
    Arc::new(|a: &[u8], b: &[u8]| a.cmp(b))
}

/// Splits a treap by the key `s` into (left, middle, right): left holds
/// keys < s, right holds keys > s, and middle is the node that held s
/// itself, or empty if s was absent.
pub(crate) fn split(
    state: &StoreState,
    compare: &KeyCompare,
    n: &NodeRef,
    s: &[u8],
) -> Result<(NodeRef, NodeRef, NodeRef)> {
    let Some(node) = n.load(state)? else {
        return Ok((NodeRef::empty(), NodeRef::empty(), NodeRef::empty()));
    };
    let item = node.item.load(state, false)?;
    match compare(s, &item.key) {
        Ordering::Equal => Ok((node.left.clone(), n.clone(), node.right.clone())),
        Ordering::Less => {
            let (left, middle, right) = split(state, compare, &node.left, s)?;
            let new = Node::new(node.item.clone(), right, node.right.clone());
            Ok((left, middle, NodeRef::from_node(new)))
        }
        Ordering::Greater => {
            let (left, middle, right) = split(state, compare, &node.right, s)?;
            let new = Node::new(node.item.clone(), node.left.clone(), left);
            Ok((NodeRef::from_node(new), middle, right))
        }
    }
}

/// Joins two treaps under the precondition that every key in `this` is
/// less than every key in `that`. Priority ties go to the `that` side.
pub(crate) fn join(state: &StoreState, this: &NodeRef, that: &NodeRef) -> Result<NodeRef> {
    let Some(this_node) = this.load(state)? else {
        return Ok(that.clone());
    };
    let Some(that_node) = that.load(state)? else {
        return Ok(this.clone());
    };
    let this_item = this_node.item.load(state, false)?;
    let that_item = that_node.item.load(state, false)?;
    if this_item.priority > that_item.priority {
        let right = join(state, &this_node.right, that)?;
        Ok(NodeRef::from_node(Node::new(
            this_node.item.clone(),
            this_node.left.clone(),
            right,
        )))
    } else {
        let left = join(state, this, &that_node.left)?;
        Ok(NodeRef::from_node(Node::new(
            that_node.item.clone(),
            left,
            that_node.right.clone(),
        )))
    }
}

/// Merges two treaps. When the same key appears in both, the item from
/// `that` wins. Priority ties resolve exactly as in join.
pub(crate) fn union(
    state: &StoreState,
    compare: &KeyCompare,
    this: &NodeRef,
    that: &NodeRef,
) -> Result<NodeRef> {
    let Some(this_node) = this.load(state)? else {
        return Ok(that.clone());
    };
    let Some(that_node) = that.load(state)? else {
        return Ok(this.clone());
    };
    let this_item = this_node.item.load(state, false)?;
    let that_item = that_node.item.load(state, false)?;
    if this_item.priority > that_item.priority {
        let (left, middle, right) = split(state, compare, that, &this_item.key)?;
        let new_left = union(state, compare, &this_node.left, &left)?;
        let new_right = union(state, compare, &this_node.right, &right)?;
        // On an equal key the `that` side wins.
        let item = match middle.load(state)? {
            Some(mid) => mid.item.clone(),
            None => this_node.item.clone(),
        };
        Ok(NodeRef::from_node(Node::new(item, new_left, new_right)))
    } else {
        // Discard the middle: the `that` item takes precedence.
        let (left, _, right) = split(state, compare, this, &that_item.key)?;
        let new_left = union(state, compare, &left, &that_node.left)?;
        let new_right = union(state, compare, &right, &that_node.right)?;
        Ok(NodeRef::from_node(Node::new(
            that_node.item.clone(),
            new_left,
            new_right,
        )))
    }
}

/// Walks the chosen edge to its end and returns that node's item, or
/// None for an empty tree. Picking left yields the minimum, right the
/// maximum.
pub(crate) fn edge(
    state: &StoreState,
    root: &NodeRef,
    with_value: bool,
    pick: fn(&Node) -> &NodeRef,
) -> Result<Option<Arc<Item>>> {
    let Some(mut node) = root.load(state)? else {
        return Ok(None);
    };
    loop {
        let child = pick(&node).load(state)?;
        match child {
            Some(child) => node = child,
            None => return node.item.load(state, with_value).map(Some),
        }
    }
}

/// Visits items with key >= target in ascending order. Returns false as
/// soon as the visitor requests a halt.
pub(crate) fn visit_ascend(
    state: &StoreState,
    compare: &KeyCompare,
    n: &NodeRef,
    target: &[u8],
    with_value: bool,
    visitor: &mut dyn FnMut(&Item) -> bool,
) -> Result<bool> {
    let Some(node) = n.load(state)? else {
        return Ok(true);
    };
    let item = node.item.load(state, false)?;
    if compare(target, &item.key) != Ordering::Greater {
        if !visit_ascend(state, compare, &node.left, target, with_value, visitor)? {
            return Ok(false);
        }
        let item = node.item.load(state, with_value)?;
        if !visitor(&item) {
            return Ok(false);
        }
    }
    visit_ascend(state, compare, &node.right, target, with_value, visitor)
}

/// Standard BST descent for a single key.
pub(crate) fn lookup(
    state: &StoreState,
    compare: &KeyCompare,
    root: &NodeRef,
    key: &[u8],
    with_value: bool,
) -> Result<Option<Arc<Item>>> {
    let mut n = root.clone();
    loop {
        let Some(node) = n.load(state)? else {
            return Ok(None);
        };
        let item = node.item.load(state, false)?;
        match compare(key, &item.key) {
            Ordering::Less => n = node.left.clone(),
            Ordering::Greater => n = node.right.clone(),
            Ordering::Equal => {
                if with_value {
                    return node.item.load(state, true).map(Some);
                }
                return Ok(Some(item));
            }
        }
    }
}

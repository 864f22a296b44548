use std::io::Cursor;
use std::sync::{Arc, RwLock};

use crate::corrupt;
use crate::encoding::{PLoc, PLOC_SIZE};
use crate::error::Result;
use crate::store::state::StoreState;

use super::item::ItemRef;

/// Node record: three contiguous PLocs (item, left child, right child).
/// An empty child is encoded as the empty PLoc.
pub const NODE_SIZE: usize = 3 * PLOC_SIZE;

/// An interior treap node owning one item and two children.
pub(crate) struct Node {
    pub(crate) item: ItemRef,
    pub(crate) left: NodeRef,
    pub(crate) right: NodeRef,
}

impl Node {
    pub(crate) fn new(item: ItemRef, left: NodeRef, right: NodeRef) -> Self {
        Node { item, left, right }
    }

    /// Encodes the node record. The item and both children must already
    /// be persisted: items are flushed before nodes, nodes children-first.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let item_loc = self
            .item
            .loc()
            .ok_or_else(|| corrupt!("node encode saw an unpersisted item"))?;
        let mut buf = Vec::with_capacity(NODE_SIZE);
        item_loc.encode(&mut buf)?;
        Self::child_loc(&self.left)?.encode(&mut buf)?;
        Self::child_loc(&self.right)?.encode(&mut buf)?;
        Ok(buf)
    }

    fn child_loc(child: &NodeRef) -> Result<PLoc> {
        if child.is_empty() {
            return Ok(PLoc::default());
        }
        child
            .loc()
            .ok_or_else(|| corrupt!("node encode saw an unpersisted child"))
    }

    /// Decodes a node record into a node whose item and children are
    /// unloaded references. Children are not read recursively.
    pub(crate) fn decode(buf: &[u8]) -> Result<Node> {
        if buf.len() != NODE_SIZE {
            return Err(corrupt!(
                "node record is {} bytes, expected {NODE_SIZE}",
                buf.len()
            ));
        }
        let mut reader = Cursor::new(buf);
        let item_loc = PLoc::decode(&mut reader)?;
        let left = PLoc::decode(&mut reader)?;
        let right = PLoc::decode(&mut reader)?;
        if item_loc.is_empty() {
            return Err(corrupt!("node record has an empty item location"));
        }
        Ok(Node {
            item: ItemRef::from_loc(item_loc),
            left: NodeRef::from_loc(left),
            right: NodeRef::from_loc(right),
        })
    }
}

/// Lazy handle to a treap node: a persisted location, an in-memory node,
/// or both; a handle with neither is the empty subtree. Cloning shares
/// the slot, so loads and flushes through any clone are visible to all
/// of them, including snapshots.
#[derive(Clone, Default)]
pub(crate) struct NodeRef {
    slot: Option<Arc<RwLock<NodeSlot>>>,
}

struct NodeSlot {
    loc: Option<PLoc>,
    node: Option<Arc<Node>>,
}

impl NodeRef {
    /// The empty subtree.
    pub(crate) fn empty() -> Self {
        NodeRef { slot: None }
    }

    /// A dirty reference to an in-memory node, not yet persisted.
    pub(crate) fn from_node(node: Node) -> Self {
        NodeRef {
            slot: Some(Arc::new(RwLock::new(NodeSlot {
                loc: None,
                node: Some(Arc::new(node)),
            }))),
        }
    }

    /// A clean reference to a persisted, not-yet-loaded node. The empty
    /// location denotes the empty subtree.
    pub(crate) fn from_loc(loc: PLoc) -> Self {
        if loc.is_empty() {
            return NodeRef::empty();
        }
        NodeRef {
            slot: Some(Arc::new(RwLock::new(NodeSlot {
                loc: Some(loc),
                node: None,
            }))),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match &self.slot {
            None => true,
            Some(slot) => {
                let slot = slot.read().unwrap();
                slot.loc.is_none() && slot.node.is_none()
            }
        }
    }

    pub(crate) fn loc(&self) -> Option<PLoc> {
        self.slot.as_ref().and_then(|slot| slot.read().unwrap().loc)
    }

    /// Returns the in-memory node without touching disk.
    pub(crate) fn mem(&self) -> Option<Arc<Node>> {
        self.slot
            .as_ref()
            .and_then(|slot| slot.read().unwrap().node.clone())
    }

    /// Ensures the node record is decoded and returns it, or None for the
    /// empty subtree. Children are left unloaded.
    pub(crate) fn load(&self, state: &StoreState) -> Result<Option<Arc<Node>>> {
        let Some(slot) = &self.slot else {
            return Ok(None);
        };
        let loc = {
            let slot = slot.read().unwrap();
            if let Some(node) = &slot.node {
                return Ok(Some(node.clone()));
            }
            match slot.loc {
                Some(loc) => loc,
                None => return Ok(None),
            }
        };
        let buf = state.read_record(loc)?;
        let node = Arc::new(Node::decode(&buf)?);
        let mut slot = slot.write().unwrap();
        if let Some(existing) = &slot.node {
            return Ok(Some(existing.clone()));
        }
        slot.node = Some(node.clone());
        Ok(Some(node))
    }

    /// Appends the node record if dirty, recording the new location. The
    /// item and both children must already have locations.
    pub(crate) fn write(&self, state: &StoreState) -> Result<()> {
        let Some(slot) = &self.slot else {
            return Ok(());
        };
        let mut slot = slot.write().unwrap();
        if slot.loc.is_some() {
            return Ok(());
        }
        let Some(node) = &slot.node else {
            return Ok(());
        };
        let buf = node.encode()?;
        let loc = state.append(&buf)?;
        slot.loc = Some(loc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_roundtrip() {
        let node = Node::new(
            ItemRef::from_loc(PLoc::new(100, 20)),
            NodeRef::from_loc(PLoc::new(200, 36)),
            NodeRef::from_loc(PLoc::new(300, 36)),
        );
        let encoded = node.encode().expect("Failed to encode node");
        assert_eq!(encoded.len(), NODE_SIZE);

        let decoded = Node::decode(&encoded).expect("Failed to decode node");
        assert_eq!(decoded.item.loc(), Some(PLoc::new(100, 20)));
        assert_eq!(decoded.left.loc(), Some(PLoc::new(200, 36)));
        assert_eq!(decoded.right.loc(), Some(PLoc::new(300, 36)));

        let reencoded = decoded.encode().expect("Failed to re-encode node");
        assert_eq!(reencoded, encoded);
    }

    #[test]
    fn test_node_empty_children() {
        let node = Node::new(
            ItemRef::from_loc(PLoc::new(100, 20)),
            NodeRef::empty(),
            NodeRef::empty(),
        );
        let encoded = node.encode().expect("Failed to encode node");
        // Empty children are all-zero PLocs.
        assert_eq!(&encoded[PLOC_SIZE..], &[0u8; 2 * PLOC_SIZE]);

        let decoded = Node::decode(&encoded).expect("Failed to decode node");
        assert!(decoded.left.is_empty());
        assert!(decoded.right.is_empty());
    }

    #[test]
    fn test_node_bad_size() {
        assert!(Node::decode(&[0u8; NODE_SIZE - 1]).is_err());
        assert!(Node::decode(&[0u8; NODE_SIZE + 1]).is_err());
    }

    #[test]
    fn test_node_empty_item_location() {
        // A record whose item PLoc is empty is corrupt.
        let result = Node::decode(&[0u8; NODE_SIZE]);
        assert!(matches!(result, Err(crate::Error::Corrupt(_))));
    }

    #[test]
    fn test_node_encode_requires_persisted_children() {
        let dirty_child = NodeRef::from_node(Node::new(
            ItemRef::from_loc(PLoc::new(1, 1)),
            NodeRef::empty(),
            NodeRef::empty(),
        ));
        let node = Node::new(
            ItemRef::from_loc(PLoc::new(100, 20)),
            dirty_child,
            NodeRef::empty(),
        );
        assert!(node.encode().is_err());
    }

    #[test]
    fn test_noderef_states() {
        assert!(NodeRef::empty().is_empty());
        assert!(NodeRef::from_loc(PLoc::default()).is_empty());
        assert!(NodeRef::default().is_empty());

        let clean = NodeRef::from_loc(PLoc::new(10, 36));
        assert!(!clean.is_empty());
        assert_eq!(clean.loc(), Some(PLoc::new(10, 36)));
        assert!(clean.mem().is_none());

        let dirty = NodeRef::from_node(Node::new(
            ItemRef::from_loc(PLoc::new(1, 1)),
            NodeRef::empty(),
            NodeRef::empty(),
        ));
        assert!(!dirty.is_empty());
        assert_eq!(dirty.loc(), None);
        assert!(dirty.mem().is_some());
    }
}

use std::io::Cursor;
use std::sync::{Arc, RwLock};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::corrupt;
use crate::encoding::format::Raw;
use crate::encoding::PLoc;
use crate::errinput;
use crate::error::Result;
use crate::store::state::StoreState;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 65535;

/// Item record header: u32 record length, u16 key length, u32 value
/// length, i32 priority.
pub const ITEM_HEADER_SIZE: usize = 14;

/// An ordered key-value pair with a treap balancing priority. Items
/// handed out by read paths are immutable snapshots of store state;
/// mutating them has no effect on the store.
#[derive(Clone, PartialEq)]
pub struct Item {
    pub key: Vec<u8>,
    /// None when the value has not been fetched from disk.
    pub val: Option<Vec<u8>>,
    /// Balancing priority. Random priorities keep expected treap depth
    /// logarithmic; degenerate priorities degenerate the tree.
    pub priority: i32,
}

impl Item {
    pub fn new(key: Vec<u8>, val: Vec<u8>, priority: i32) -> Self {
        Item {
            key,
            val: Some(val),
            priority,
        }
    }

    /// Validates the key constraints: non-empty, at most MAX_KEY_LEN bytes.
    pub(crate) fn check_key(key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(errinput!("key must not be empty"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(errinput!("key length {} exceeds {MAX_KEY_LEN}", key.len()));
        }
        Ok(())
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let val = self.val.as_ref().ok_or_else(|| {
            corrupt!(
                "cannot persist item {} with unfetched value",
                Raw::bytes(&self.key)
            )
        })?;
        let length = ITEM_HEADER_SIZE + self.key.len() + val.len();
        let mut buf = Vec::with_capacity(length);
        buf.write_u32::<BigEndian>(length as u32)?;
        buf.write_u16::<BigEndian>(self.key.len() as u16)?;
        buf.write_u32::<BigEndian>(val.len() as u32)?;
        buf.write_i32::<BigEndian>(self.priority)?;
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(val);
        Ok(buf)
    }

    /// Decodes an item record. With `with_value` false only the key is
    /// retained; the value slot stays unfetched.
    pub(crate) fn decode(buf: &[u8], with_value: bool) -> Result<Item> {
        if buf.len() < ITEM_HEADER_SIZE {
            return Err(corrupt!(
                "item record is {} bytes, shorter than the {ITEM_HEADER_SIZE}-byte header",
                buf.len()
            ));
        }
        let mut reader = Cursor::new(buf);
        let length = reader.read_u32::<BigEndian>()? as usize;
        let key_length = reader.read_u16::<BigEndian>()? as usize;
        let val_length = reader.read_u32::<BigEndian>()? as usize;
        let priority = reader.read_i32::<BigEndian>()?;
        if length != ITEM_HEADER_SIZE + key_length + val_length {
            return Err(corrupt!(
                "mismatched item lengths: record {length} != header {ITEM_HEADER_SIZE} + key {key_length} + val {val_length}"
            ));
        }
        if buf.len() != length {
            return Err(corrupt!(
                "item record is {} bytes, expected {length}",
                buf.len()
            ));
        }
        let key = buf[ITEM_HEADER_SIZE..ITEM_HEADER_SIZE + key_length].to_vec();
        let val = with_value.then(|| buf[ITEM_HEADER_SIZE + key_length..length].to_vec());
        Ok(Item { key, val, priority })
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("key", &Raw::bytes(&self.key))
            .field("val", &self.val.as_deref().map(Raw::bytes))
            .field("priority", &self.priority)
            .finish()
    }
}

/// Lazy handle to an item: a persisted location, an in-memory copy, or
/// both. Cloning shares the slot, so a load through any clone is visible
/// to all of them.
#[derive(Clone)]
pub(crate) struct ItemRef {
    slot: Arc<RwLock<ItemSlot>>,
}

struct ItemSlot {
    loc: Option<PLoc>,
    item: Option<Arc<Item>>,
}

impl ItemRef {
    /// A dirty reference to an in-memory item, not yet persisted.
    pub(crate) fn from_item(item: Item) -> Self {
        ItemRef {
            slot: Arc::new(RwLock::new(ItemSlot {
                loc: None,
                item: Some(Arc::new(item)),
            })),
        }
    }

    /// A clean reference to a persisted, not-yet-loaded item.
    pub(crate) fn from_loc(loc: PLoc) -> Self {
        ItemRef {
            slot: Arc::new(RwLock::new(ItemSlot {
                loc: Some(loc),
                item: None,
            })),
        }
    }

    pub(crate) fn loc(&self) -> Option<PLoc> {
        self.slot.read().unwrap().loc
    }

    /// Ensures an in-memory copy is present and returns it. With
    /// `with_value` false the value slot may stay unfetched; a later
    /// with-value load re-reads the record and fills it.
    pub(crate) fn load(&self, state: &StoreState, with_value: bool) -> Result<Arc<Item>> {
        if let Some(item) = self.cached(with_value) {
            return Ok(item);
        }
        let loc = self
            .loc()
            .ok_or_else(|| corrupt!("item has neither a location nor an in-memory copy"))?;
        let buf = state.read_record(loc)?;
        let item = Arc::new(Item::decode(&buf, with_value)?);
        let mut slot = self.slot.write().unwrap();
        // A concurrent loader may have published a satisfying copy already.
        if let Some(existing) = &slot.item {
            if !with_value || existing.val.is_some() {
                return Ok(existing.clone());
            }
        }
        slot.item = Some(item.clone());
        Ok(item)
    }

    fn cached(&self, with_value: bool) -> Option<Arc<Item>> {
        let slot = self.slot.read().unwrap();
        match &slot.item {
            Some(item) if !with_value || item.val.is_some() => Some(item.clone()),
            _ => None,
        }
    }

    /// Appends the item record if dirty, recording the new location.
    pub(crate) fn flush(&self, state: &StoreState) -> Result<()> {
        let mut slot = self.slot.write().unwrap();
        if slot.loc.is_some() {
            return Ok(());
        }
        let item = slot
            .item
            .as_ref()
            .ok_or_else(|| corrupt!("flush saw an item with no location and no in-memory copy"))?;
        let buf = item.encode()?;
        let loc = state.append(&buf)?;
        slot.loc = Some(loc);
        Ok(())
    }
}

pub mod encoding;
pub mod error;
pub mod file;
pub mod store;
pub mod treap;

pub use error::{Error, Result};
pub use file::{ReadWriteAt, SharedFile};
pub use store::{Collection, Store, VERSION};
pub use treap::{bytes_compare, Item, KeyCompare, MAX_KEY_LEN};

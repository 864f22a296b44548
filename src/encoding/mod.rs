//! Binary encoding of persisted records. All on-disk integers are
//! big-endian.

pub mod format;

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Encoded size of a PLoc: 8-byte offset plus 4-byte length.
pub const PLOC_SIZE: usize = 12;

/// Offset and length of a persisted range of bytes. The empty location
/// (offset 0, length 0) marks an absent child or an unwritten root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PLoc {
    /// File offset of the first byte of the record.
    #[serde(rename = "o")]
    pub offset: i64,
    /// Number of bytes in the record.
    #[serde(rename = "l")]
    pub length: u32,
}

impl PLoc {
    pub fn new(offset: i64, length: u32) -> Self {
        PLoc { offset, length }
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0 && self.length == 0
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<BigEndian>(self.offset)?;
        writer.write_u32::<BigEndian>(self.length)?;
        Ok(())
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let offset = reader.read_i64::<BigEndian>()?;
        let length = reader.read_u32::<BigEndian>()?;
        Ok(PLoc { offset, length })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ploc_roundtrip() {
        let original = PLoc::new(0x0102030405060708, 0x0a0b0c0d);

        let mut encoded = Vec::new();
        original.encode(&mut encoded).expect("Failed to encode PLoc");
        assert_eq!(encoded.len(), PLOC_SIZE);
        assert_eq!(
            encoded,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 0x0a, 0x0b, 0x0c, 0x0d]
        );

        let decoded = PLoc::decode(&mut Cursor::new(&encoded)).expect("Failed to decode PLoc");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_ploc_empty() {
        assert!(PLoc::default().is_empty());
        assert!(!PLoc::new(0, 1).is_empty());
        assert!(!PLoc::new(1, 0).is_empty());
    }

    #[test]
    fn test_ploc_truncated() {
        let mut encoded = Vec::new();
        PLoc::new(7, 9).encode(&mut encoded).expect("Failed to encode PLoc");
        encoded.truncate(PLOC_SIZE - 1);
        assert!(PLoc::decode(&mut Cursor::new(&encoded)).is_err());
    }

    #[test]
    fn test_ploc_json_form() {
        let json = serde_json::to_string(&PLoc::new(42, 7)).expect("Failed to serialize PLoc");
        assert_eq!(json, r#"{"o":42,"l":7}"#);

        let json = serde_json::to_string(&PLoc::default()).expect("Failed to serialize PLoc");
        assert_eq!(json, r#"{"o":0,"l":0}"#);

        let decoded: PLoc =
            serde_json::from_str(r#"{"o":42,"l":7}"#).expect("Failed to deserialize PLoc");
        assert_eq!(decoded, PLoc::new(42, 7));
    }
}

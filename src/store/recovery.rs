use std::collections::{BTreeMap, HashMap};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::corrupt;
use crate::encoding::PLoc;
use crate::error::{Error, Result};

use super::state::StoreState;
use super::VERSION;

pub(crate) const MAGIC_BEG: &[u8; 6] = b"0g1t2r";
pub(crate) const MAGIC_END: &[u8; 6] = b"3e4a5p";

/// Trailing root-record footer: root offset, duplicate length, doubled
/// end marker.
const END_FOOTER_SIZE: usize = 8 + 4 + 2 * MAGIC_END.len();

/// Smallest possible root record: doubled begin marker, version, length,
/// plus the footer.
const MIN_ROOT_RECORD: i64 = (2 * MAGIC_BEG.len() + 4 + 4 + END_FOOTER_SIZE) as i64;

/// Serializes the collection map and appends a root record at the
/// cursor. The record carries the length twice and its own offset so the
/// backward scan can verify candidates from either end.
pub(crate) fn write_roots(state: &StoreState, roots: &BTreeMap<String, PLoc>) -> Result<()> {
    let json = serde_json::to_vec(roots)?;
    let offset = state.size();
    let length = MIN_ROOT_RECORD as usize + json.len();
    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(MAGIC_BEG);
    buf.extend_from_slice(MAGIC_BEG);
    buf.write_u32::<BigEndian>(VERSION)?;
    buf.write_u32::<BigEndian>(length as u32)?;
    buf.extend_from_slice(&json);
    buf.write_i64::<BigEndian>(offset)?;
    buf.write_u32::<BigEndian>(length as u32)?;
    buf.extend_from_slice(MAGIC_END);
    buf.extend_from_slice(MAGIC_END);
    state.append(&buf)?;
    Ok(())
}

/// Scans backwards from the end of the file for the most recent complete
/// root record, decodes its collection map, and repositions the cursor at
/// the record's end.
///
/// A stored value may contain the end marker, and a partial flush may
/// leave a truncated record at the tail; every candidate is therefore
/// verified against the doubled markers, both length copies, and the
/// embedded root offset before being accepted.
pub(crate) fn read_roots(state: &StoreState) -> Result<HashMap<String, PLoc>> {
    let mut p = state.size();
    tracing::debug!(size = p, "scanning backwards for root record");
    loop {
        if p < MIN_ROOT_RECORD {
            return Err(corrupt!("could not find roots; file corrupted or wrong?"));
        }
        let footer = state.read_record(PLoc::new(
            p - END_FOOTER_SIZE as i64,
            END_FOOTER_SIZE as u32,
        ))?;
        if footer[12..18] != MAGIC_END[..] || footer[18..24] != MAGIC_END[..] {
            p -= 1;
            continue;
        }
        let root_offset = BigEndian::read_i64(&footer[0..8]);
        let length = BigEndian::read_u32(&footer[8..12]);
        if root_offset < 0
            || root_offset >= p - MIN_ROOT_RECORD
            || i64::from(length) != p - root_offset
        {
            // A false end marker inside stored bytes; keep scanning.
            p -= 1;
            continue;
        }
        let data_len = i64::from(length) as usize - END_FOOTER_SIZE;
        let data = state.read_record(PLoc::new(root_offset, data_len as u32))?;
        if data[0..6] != MAGIC_BEG[..] || data[6..12] != MAGIC_BEG[..] {
            p -= 1;
            continue;
        }
        let version = BigEndian::read_u32(&data[12..16]);
        let embedded = BigEndian::read_u32(&data[16..20]);
        if embedded != length {
            p -= 1;
            continue;
        }
        if version != VERSION {
            return Err(Error::VersionMismatch { found: version });
        }
        let roots: HashMap<String, PLoc> = serde_json::from_slice(&data[20..])?;
        state.set_size(p);
        tracing::debug!(
            collections = roots.len(),
            offset = root_offset,
            "found root record"
        );
        return Ok(roots);
    }
}

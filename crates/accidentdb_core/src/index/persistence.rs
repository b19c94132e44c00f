//! Sidecar persistence for the primary index.
//!
//! ## Format
//!
//! A flat sequence of 16-byte entries with no header:
//! ```text
//! [id: u64 LE][offset: u64 LE] ...
//! ```
//! Entry order is not significant. Writers emit entries in id order.
//!
//! ## Invariants
//!
//! - The sidecar is derivable from the data file
//! - A trailing partial entry is ignored, not an error

use std::collections::BTreeMap;

/// Size of one sidecar entry.
pub const ENTRY_SIZE: usize = 16;

/// Encodes index entries.
#[must_use]
pub fn encode_entries(entries: &BTreeMap<u64, u64>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * ENTRY_SIZE);
    for (&id, &offset) in entries {
        buf.extend_from_slice(&id.to_le_bytes());
        buf.extend_from_slice(&offset.to_le_bytes());
    }
    buf
}

/// Decodes sidecar bytes.
///
/// Returns the entries and the number of trailing bytes that did not form
/// a complete entry. A repeated id keeps its last offset.
#[must_use]
pub fn decode_entries(data: &[u8]) -> (BTreeMap<u64, u64>, usize) {
    let mut entries = BTreeMap::new();
    let chunks = data.chunks_exact(ENTRY_SIZE);
    let trailing = chunks.remainder().len();
    for chunk in chunks {
        let mut id = [0u8; 8];
        let mut offset = [0u8; 8];
        id.copy_from_slice(&chunk[..8]);
        offset.copy_from_slice(&chunk[8..]);
        entries.insert(u64::from_le_bytes(id), u64::from_le_bytes(offset));
    }
    (entries, trailing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_sixteen_bytes_little_endian() {
        let mut entries = BTreeMap::new();
        entries.insert(2u64, 0x10u64);
        let bytes = encode_entries(&entries);
        assert_eq!(bytes.len(), ENTRY_SIZE);
        assert_eq!(&bytes[..8], &2u64.to_le_bytes());
        assert_eq!(&bytes[8..], &0x10u64.to_le_bytes());
    }

    #[test]
    fn decode_accepts_any_entry_order() {
        let mut bytes = Vec::new();
        for (id, offset) in [(9u64, 900u64), (1, 100), (5, 500)] {
            bytes.extend_from_slice(&id.to_le_bytes());
            bytes.extend_from_slice(&offset.to_le_bytes());
        }
        let (entries, trailing) = decode_entries(&bytes);
        assert_eq!(trailing, 0);
        assert_eq!(entries.keys().copied().collect::<Vec<_>>(), vec![1, 5, 9]);
        assert_eq!(entries[&5], 500);
    }

    #[test]
    fn partial_trailing_entry_is_ignored() {
        let mut entries = BTreeMap::new();
        entries.insert(1u64, 0u64);
        let mut bytes = encode_entries(&entries);
        bytes.extend_from_slice(&[1, 2, 3]);
        let (decoded, trailing) = decode_entries(&bytes);
        assert_eq!(decoded, entries);
        assert_eq!(trailing, 3);
    }
}

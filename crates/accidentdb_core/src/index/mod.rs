//! Primary index: `id → header offset`.
//!
//! The index lives in memory and is mirrored to a sidecar file that is
//! rewritten atomically on every flush. The sidecar is an accelerator;
//! the data file is the source of truth and a rebuild regenerates it.

mod persistence;

pub use persistence::{decode_entries, encode_entries, ENTRY_SIZE};

use crate::dir::write_atomic;
use crate::error::CoreResult;
use crate::types::RecordId;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// In-memory primary index with an optional sidecar file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryIndex {
    entries: BTreeMap<u64, u64>,
    sidecar: Option<PathBuf>,
}

impl PrimaryIndex {
    /// Creates an empty index persisted to `sidecar`.
    #[must_use]
    pub fn new(sidecar: impl Into<PathBuf>) -> Self {
        Self {
            entries: BTreeMap::new(),
            sidecar: Some(sidecar.into()),
        }
    }

    /// Creates an empty index with no sidecar; `flush` is a no-op.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the sidecar at `path`. A missing file yields an empty index.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let (entries, trailing) = decode_entries(&data);
        if trailing > 0 {
            warn!(path = %path.display(), trailing, "index sidecar has a partial entry");
        }
        Ok(Self {
            entries,
            sidecar: Some(path.to_path_buf()),
        })
    }

    /// Offset of the live record for `id`.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<u64> {
        self.entries.get(&id.as_u64()).copied()
    }

    /// Whether `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.entries.contains_key(&id.as_u64())
    }

    /// Points `id` at `offset`, returning the previous offset.
    pub fn put(&mut self, id: RecordId, offset: u64) -> Option<u64> {
        self.entries.insert(id.as_u64(), offset)
    }

    /// Removes `id`, returning its offset.
    pub fn remove(&mut self, id: RecordId) -> Option<u64> {
        self.entries.remove(&id.as_u64())
    }

    /// All ids in ascending order.
    #[must_use]
    pub fn keys_sorted(&self) -> Vec<RecordId> {
        self.entries.keys().copied().map(RecordId::new).collect()
    }

    /// `(id, offset)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, u64)> + '_ {
        self.entries.iter().map(|(&id, &offset)| (RecordId::new(id), offset))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces every entry.
    pub fn replace(&mut self, entries: BTreeMap<u64, u64>) {
        self.entries = entries;
    }

    /// The raw entry map.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<u64, u64> {
        &self.entries
    }

    /// Path of the sidecar, if any.
    #[must_use]
    pub fn sidecar(&self) -> Option<&Path> {
        self.sidecar.as_deref()
    }

    /// Rewrites the sidecar atomically.
    pub fn flush(&self) -> CoreResult<()> {
        match &self.sidecar {
            Some(path) => write_atomic(path, &encode_entries(&self.entries)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_remove() {
        let mut index = PrimaryIndex::in_memory();
        assert!(index.put(RecordId::new(1), 0).is_none());
        assert_eq!(index.put(RecordId::new(1), 77), Some(0));
        assert_eq!(index.get(RecordId::new(1)), Some(77));
        assert_eq!(index.remove(RecordId::new(1)), Some(77));
        assert!(index.get(RecordId::new(1)).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn keys_are_sorted() {
        let mut index = PrimaryIndex::in_memory();
        for id in [5, 1, 3] {
            index.put(RecordId::new(id), id * 10);
        }
        assert_eq!(
            index.keys_sorted(),
            vec![RecordId::new(1), RecordId::new(3), RecordId::new(5)]
        );
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn flush_then_load_round_trips() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("t.idx");
        let mut index = PrimaryIndex::new(&path);
        index.put(RecordId::new(2), 53);
        index.put(RecordId::new(1), 0);
        index.flush().unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 32);
        let loaded = PrimaryIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn load_missing_sidecar_is_empty() {
        let temp = tempdir().unwrap();
        let index = PrimaryIndex::load(&temp.path().join("absent.idx")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn load_tolerates_partial_entry() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("t.idx");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u64.to_le_bytes());
        bytes.extend_from_slice(&8u64.to_le_bytes());
        bytes.extend_from_slice(&[0xff; 7]);
        fs::write(&path, bytes).unwrap();

        let index = PrimaryIndex::load(&path).unwrap();
        assert_eq!(index.get(RecordId::new(4)), Some(8));
        assert_eq!(index.len(), 1);
    }
}

//! Data file compaction.
//!
//! Compaction rewrites the data file keeping only the records the primary
//! index points to. Each kept record is copied byte for byte (id, timestamp
//! and hash unchanged) and the output is ordered by id.
//!
//! ## Invariants
//!
//! - Compaction **MUST NOT** change the live set or any live id
//! - The output holds no tombstones
//! - A data file with corrupt regions is refused, since what they held is unknown

use super::codec::StoredRecord;
use super::data_file::DataFile;
use super::scan::ScanEntry;
use crate::error::{CoreError, CoreResult};
use crate::index::PrimaryIndex;
use accidentdb_storage::{FileBackend, StorageBackend};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Result of a compaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionResult {
    /// Records in the input file.
    pub input_records: usize,
    /// Records written to the output file.
    pub output_records: usize,
    /// Tombstones dropped.
    pub tombstones_removed: usize,
    /// Size of the input file in bytes.
    pub bytes_before: u64,
    /// Size of the output file in bytes.
    pub bytes_after: u64,
}

impl CompactionResult {
    /// Bytes reclaimed.
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Writes compacted copies of a data file.
#[derive(Debug, Default)]
pub struct Compactor;

impl Compactor {
    /// Creates a compactor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Writes the records of `input` that `index` points to into a new file
    /// at `output`, in id order, and fsyncs it.
    ///
    /// The caller is responsible for swapping `output` into place.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptFile`] if the input contains corrupt
    /// regions or lacks a record the index points to.
    pub fn compact_into(
        &self,
        input: &DataFile,
        index: &PrimaryIndex,
        output: &Path,
    ) -> CoreResult<CompactionResult> {
        let mut result = CompactionResult {
            bytes_before: input.size()?,
            ..CompactionResult::default()
        };

        let mut kept: BTreeMap<u64, StoredRecord> = BTreeMap::new();
        for entry in input.scan() {
            match entry? {
                ScanEntry::Record { offset, record } => {
                    result.input_records += 1;
                    if !record.header.live {
                        result.tombstones_removed += 1;
                    } else if index.get(record.header.id) == Some(offset) {
                        kept.insert(record.header.id.as_u64(), record);
                    }
                }
                ScanEntry::Corrupt { offset, len } => {
                    return Err(CoreError::corrupt_file(format!(
                        "refusing to compact: {len} corrupt bytes at offset {offset}"
                    )));
                }
            }
        }
        if kept.len() != index.len() {
            return Err(CoreError::corrupt_file(format!(
                "index has {} entries but only {} indexed records were found",
                index.len(),
                kept.len()
            )));
        }

        if output.exists() {
            fs::remove_file(output)?;
        }
        let mut backend = FileBackend::open(output)?;
        for record in kept.values() {
            backend.append(&record.encode())?;
        }
        backend.sync()?;

        result.output_records = kept.len();
        result.bytes_after = backend.size()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::HEADER_SIZE;
    use crate::types::RecordId;
    use tempfile::tempdir;

    fn live(id: u64) -> StoredRecord {
        StoredRecord::live(RecordId::new(id), format!("{{\"v\":{id}}}").into_bytes())
    }

    #[test]
    fn drops_tombstones_and_orders_by_id() {
        let temp = tempdir().unwrap();
        let mut file = DataFile::open(&temp.path().join("in.db"), 1024).unwrap();
        let mut index = PrimaryIndex::in_memory();

        // id 2 is written before id 1, id 3 is deleted
        let two = live(2);
        let o2 = file.append(&two).unwrap();
        let o1 = file.append(&live(1)).unwrap();
        let o3 = file.append(&live(3)).unwrap();
        file.mark_tombstone(o3).unwrap();
        index.put(RecordId::new(2), o2);
        index.put(RecordId::new(1), o1);

        let out_path = temp.path().join("out.db");
        let result = Compactor::new().compact_into(&file, &index, &out_path).unwrap();
        assert_eq!(result.input_records, 3);
        assert_eq!(result.output_records, 2);
        assert_eq!(result.tombstones_removed, 1);
        assert!(result.bytes_saved() > 0);

        let out = DataFile::open(&out_path, 1024).unwrap();
        let first = out.read_record(0).unwrap().unwrap();
        assert_eq!(first.header.id, RecordId::new(1));
        let second = out.read_record(first.header.record_len()).unwrap().unwrap();
        assert_eq!(second, two);
    }

    #[test]
    fn corrupt_input_is_refused() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("in.db");
        let mut bytes = live(1).encode();
        bytes.extend(vec![0xaa; HEADER_SIZE * 2]);
        fs::write(&path, bytes).unwrap();

        let file = DataFile::open(&path, 1024).unwrap();
        let mut index = PrimaryIndex::in_memory();
        index.put(RecordId::new(1), 0);

        let err = Compactor::new()
            .compact_into(&file, &index, &temp.path().join("out.db"))
            .unwrap_err();
        assert!(matches!(err, CoreError::CorruptFile { .. }));
    }
}

//! Crash simulation on a closed store's files.
//!
//! A crash in the middle of an append leaves a prefix of the record on
//! disk; a failing disk or a stray writer leaves garbage or flipped bits.
//! These helpers produce those states directly on the files so recovery can
//! be exercised without killing a process.
//!
//! ## Usage
//!
//! ```rust
//! use accidentdb_testkit::prelude::*;
//!
//! let mut store = TestStore::new();
//! store.add(&sample_accident(1)).unwrap();
//! store.add(&sample_accident(2)).unwrap();
//!
//! let data = store.data_path();
//! store.reopen_after(|_| {
//!     truncate_by(&data, 10);
//! });
//! assert_eq!(store.count(), 1);
//! ```

use accidentdb_core::record::{DataFile, ScanEntry, HEADER_SIZE};
use accidentdb_core::RecordId;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Where a complete record sits in a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    /// Offset of the header.
    pub offset: u64,
    /// Header plus payload length.
    pub len: u64,
    /// Record id.
    pub id: RecordId,
    /// Whether the live flag is set.
    pub live: bool,
}

impl RecordSpan {
    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + HEADER_SIZE as u64
    }
}

/// Lists the well-formed records of a data file in file order.
pub fn record_spans(path: &Path, max_payload: u32) -> Vec<RecordSpan> {
    let file = DataFile::open(path, max_payload).expect("Failed to open data file");
    file.scan()
        .filter_map(|entry| match entry.expect("Scan failed") {
            ScanEntry::Record { offset, record } => Some(RecordSpan {
                offset,
                len: record.header.record_len(),
                id: record.header.id,
                live: record.header.live,
            }),
            ScanEntry::Corrupt { .. } => None,
        })
        .collect()
}

/// Ids with a live record lying entirely before `cut`.
pub fn live_ids_before(spans: &[RecordSpan], cut: u64) -> Vec<RecordId> {
    let mut ids: Vec<_> = spans
        .iter()
        .filter(|span| span.live && span.end() <= cut)
        .map(|span| span.id)
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Truncates a file to `fraction` of its size and returns the new length.
pub fn truncate_to_fraction(path: &Path, fraction: f64) -> u64 {
    let size = fs::metadata(path).expect("Failed to stat file").len();
    let new_len = (size as f64 * fraction.clamp(0.0, 1.0)) as u64;
    set_len(path, new_len);
    new_len
}

/// Removes the last `bytes` bytes of a file.
pub fn truncate_by(path: &Path, bytes: u64) -> u64 {
    let size = fs::metadata(path).expect("Failed to stat file").len();
    let new_len = size.saturating_sub(bytes);
    set_len(path, new_len);
    new_len
}

/// Appends raw bytes to a file.
pub fn append_garbage(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("Failed to open file");
    file.write_all(bytes).expect("Failed to append");
    file.sync_all().expect("Failed to sync");
}

/// Inverts every bit of the byte at `offset`.
pub fn flip_byte(path: &Path, offset: u64) {
    xor_byte(path, offset, 0xFF);
}

/// XORs the byte at `offset` with `mask`, e.g. to damage a single bit.
pub fn xor_byte(path: &Path, offset: u64, mask: u8) {
    let mut data = fs::read(path).expect("Failed to read file");
    let index = usize::try_from(offset).expect("Offset out of range");
    data[index] ^= mask;
    fs::write(path, data).expect("Failed to write file");
}

fn set_len(path: &Path, len: u64) {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("Failed to open file");
    file.set_len(len).expect("Failed to truncate");
    file.sync_all().expect("Failed to sync");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_accident, TestStore};

    #[test]
    fn spans_follow_appends() {
        let store = TestStore::new();
        store.add(&sample_accident(1)).unwrap();
        let second = store.add(&sample_accident(2)).unwrap();
        store.delete(second).unwrap();

        let spans = record_spans(&store.data_path(), store.config().payload_limit());
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].offset, 0);
        assert_eq!(spans[1].offset, spans[0].end());
        assert!(spans[0].live);
        assert!(!spans[1].live);
        assert_eq!(live_ids_before(&spans, u64::MAX), vec![RecordId::new(1)]);
    }

    #[test]
    fn mid_record_truncation_loses_only_the_tail() {
        let mut store = TestStore::new();
        for n in 0..3 {
            store.add(&sample_accident(n)).unwrap();
        }
        let data = store.data_path();
        store.reopen_after(|_| {
            truncate_by(&data, 7);
        });

        assert_eq!(store.count(), 2);
        assert!(store.get(RecordId::new(3)).unwrap().is_none());
        assert_eq!(store.counter(), 3);
    }

    #[test]
    fn flipped_payload_fails_verified_read() {
        let mut store = TestStore::new();
        let id = store.add(&sample_accident(4)).unwrap();
        let data = store.data_path();
        let spans = record_spans(&data, store.config().payload_limit());
        let target = spans[0].payload_offset() + 2;

        store.reopen_after(|_| flip_byte(&data, target));
        let err = store.get_verified(id).unwrap_err();
        assert_eq!(err.offset(), Some(0));
    }
}

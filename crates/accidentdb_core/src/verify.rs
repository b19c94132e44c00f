//! Read-only integrity verification.

use crate::counter::IdCounter;
use crate::error::{CoreResult, ErrorKind};
use crate::index::PrimaryIndex;
use crate::record::{DataFile, ScanEntry};
use crate::types::RecordId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Findings of `Store::verify`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Well-formed records scanned.
    pub records_scanned: usize,
    /// Live records in the data file.
    pub live_records: usize,
    /// Tombstones in the data file.
    pub tombstones: usize,
    /// Corrupt regions skipped by the scan.
    pub corrupt_regions: usize,
    /// Offsets of records whose payload does not match their hash.
    pub hash_mismatches: Vec<u64>,
    /// Bytes of an incomplete trailing record.
    pub trailing_bytes: u64,
    /// Index entries that do not point at a live header with the same id.
    pub bad_index_entries: Vec<RecordId>,
    /// Live records the index does not point to.
    pub unindexed_live: Vec<RecordId>,
    /// Whether the sidecar on disk matches the in-memory index.
    pub sidecar_matches: bool,
    /// Largest id in the data file.
    pub max_id: u64,
    /// Counter value.
    pub counter: u64,
}

impl VerifyReport {
    /// Whether the counter covers every id in the data file.
    #[must_use]
    pub fn counter_ok(&self) -> bool {
        self.counter >= self.max_id
    }

    /// Whether no problem was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.corrupt_regions == 0
            && self.hash_mismatches.is_empty()
            && self.trailing_bytes == 0
            && self.bad_index_entries.is_empty()
            && self.unindexed_live.is_empty()
            && self.sidecar_matches
            && self.counter_ok()
    }
}

pub(crate) fn verify(
    data: &DataFile,
    index: &PrimaryIndex,
    counter: &IdCounter,
) -> CoreResult<VerifyReport> {
    let mut report = VerifyReport {
        counter: counter.peek(),
        ..VerifyReport::default()
    };
    let mut live: BTreeMap<u64, u64> = BTreeMap::new();

    let mut scanner = data.scan();
    for entry in scanner.by_ref() {
        if let ScanEntry::Record { offset, record } = entry? {
            report.max_id = report.max_id.max(record.header.id.as_u64());
            if !record.hash_matches() {
                report.hash_mismatches.push(offset);
            }
            if record.header.live {
                report.live_records += 1;
                live.insert(record.header.id.as_u64(), offset);
            } else {
                report.tombstones += 1;
            }
        }
    }
    let summary = scanner.summary();
    report.records_scanned = summary.records;
    report.corrupt_regions = summary.corrupt_regions;
    report.trailing_bytes = summary.trailing_bytes;

    for (id, offset) in index.iter() {
        let ok = match data.read_header(offset) {
            Ok(Some(header)) => header.live && header.id == id,
            Ok(None) => false,
            Err(e) if e.kind() == ErrorKind::CorruptRecord => false,
            Err(e) => return Err(e),
        };
        if !ok {
            report.bad_index_entries.push(id);
        }
    }

    report.unindexed_live = live
        .iter()
        .filter(|&(&id, &offset)| index.get(RecordId::new(id)) != Some(offset))
        .map(|(&id, _)| RecordId::new(id))
        .collect();

    report.sidecar_matches = match index.sidecar() {
        Some(path) => PrimaryIndex::load(path)?.entries() == index.entries(),
        None => true,
    };

    Ok(report)
}

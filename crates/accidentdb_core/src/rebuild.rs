//! Index rebuild from a full scan of the data file.

use crate::counter::IdCounter;
use crate::error::CoreResult;
use crate::index::PrimaryIndex;
use crate::record::{DataFile, ScanEntry};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Well-formed records scanned.
    pub records_scanned: usize,
    /// Live records indexed.
    pub live_records: usize,
    /// Tombstones seen.
    pub tombstones: usize,
    /// Corrupt regions skipped.
    pub corrupt_regions: usize,
    /// Bytes of an incomplete trailing record that were cut off.
    pub truncated_bytes: u64,
    /// Largest id seen, live or not.
    pub max_id: u64,
    /// Whether the previous in-memory index differed from the rebuilt one.
    pub index_changed: bool,
}

/// Regenerates `index` from `data`, rewrites the sidecar and raises the
/// counter to the largest id seen.
///
/// A later live record for an id replaces an earlier one. An incomplete
/// trailing record is cut off so the next append starts on a record
/// boundary.
pub(crate) fn rebuild(
    data: &mut DataFile,
    index: &mut PrimaryIndex,
    counter: &mut IdCounter,
) -> CoreResult<RebuildReport> {
    let mut report = RebuildReport::default();
    let mut entries = BTreeMap::new();

    let mut scanner = data.scan();
    for entry in scanner.by_ref() {
        match entry? {
            ScanEntry::Record { offset, record } => {
                let id = record.header.id.as_u64();
                report.max_id = report.max_id.max(id);
                if record.header.live {
                    entries.insert(id, offset);
                } else {
                    report.tombstones += 1;
                }
            }
            ScanEntry::Corrupt { offset, len } => {
                warn!(offset, len, "skipped corrupt region during rebuild");
            }
        }
    }
    let summary = scanner.summary();
    report.records_scanned = summary.records;
    report.corrupt_regions = summary.corrupt_regions;
    report.live_records = entries.len();

    if summary.trailing_bytes > 0 {
        let size = data.size()?;
        let keep = size - summary.trailing_bytes;
        warn!(
            offset = keep,
            bytes = summary.trailing_bytes,
            "cutting off incomplete trailing record"
        );
        data.truncate(keep)?;
        report.truncated_bytes = summary.trailing_bytes;
    }

    report.index_changed = index.entries() != &entries;
    index.replace(entries);
    index.flush()?;
    counter.record(report.max_id)?;

    info!(
        records = report.records_scanned,
        live = report.live_records,
        tombstones = report.tombstones,
        corrupt_regions = report.corrupt_regions,
        max_id = report.max_id,
        "index rebuilt"
    );
    Ok(report)
}

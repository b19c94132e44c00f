//! Sequential scanning of the data file.
//!
//! A scan walks headers from offset 0. A short read of a header or payload
//! ends the scan cleanly: it is the remnant of an interrupted append. A
//! header that fails to decode starts a corrupt region; the scanner then
//! advances one byte at a time and only accepts a candidate record whose
//! payload hash matches, so it resumes exactly at the next intact record.
//!
//! A header whose payload runs past the end of the file is only taken for
//! an interrupted append if no intact record follows it. Otherwise its
//! length is damaged and it starts a corrupt region like any other bad
//! header, so nothing after it is mistaken for a partial tail.

use super::codec::{RecordHeader, StoredRecord, HEADER_SIZE};
use super::data_file::DataFile;
use crate::error::CoreResult;
use tracing::warn;

/// One item produced by [`RecordScanner`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEntry {
    /// A well-formed record.
    Record {
        /// Offset of the header.
        offset: u64,
        /// The record.
        record: StoredRecord,
    },
    /// A run of bytes that could not be decoded and was skipped.
    Corrupt {
        /// Offset where decoding first failed.
        offset: u64,
        /// Number of bytes skipped.
        len: u64,
    },
}

/// Totals gathered while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Well-formed records seen (live and tombstoned).
    pub records: usize,
    /// Corrupt regions skipped.
    pub corrupt_regions: usize,
    /// Bytes of an incomplete trailing record.
    pub trailing_bytes: u64,
}

enum Step {
    Record(u64, StoredRecord),
    Skip,
    End,
}

/// Iterator over the records of a [`DataFile`].
pub struct RecordScanner<'a> {
    file: &'a DataFile,
    offset: u64,
    size: Option<u64>,
    corrupt_start: Option<u64>,
    pending: Option<ScanEntry>,
    summary: ScanSummary,
    done: bool,
}

impl<'a> RecordScanner<'a> {
    pub(super) fn new(file: &'a DataFile) -> Self {
        Self {
            file,
            offset: 0,
            size: None,
            corrupt_start: None,
            pending: None,
            summary: ScanSummary::default(),
            done: false,
        }
    }

    /// Totals so far; complete once the iterator is exhausted.
    #[must_use]
    pub fn summary(&self) -> ScanSummary {
        self.summary
    }

    fn resyncing(&self) -> bool {
        self.corrupt_start.is_some()
    }

    fn skip_byte(&mut self) -> Step {
        self.corrupt_start.get_or_insert(self.offset);
        self.offset += 1;
        Step::Skip
    }

    fn step(&mut self, size: u64) -> CoreResult<Step> {
        let offset = self.offset;
        if offset + HEADER_SIZE as u64 > size {
            if offset < size && !self.resyncing() {
                self.summary.trailing_bytes = size - offset;
            }
            return Ok(Step::End);
        }

        let Some(bytes) = self.file.read_exact_at(offset, HEADER_SIZE)? else {
            return Ok(Step::End);
        };
        let header = match RecordHeader::decode(&bytes, offset, self.file.max_payload()) {
            Ok(header) => header,
            Err(e) => {
                if !self.resyncing() {
                    warn!(offset, error = %e, "corrupt header, resynchronising");
                }
                return Ok(self.skip_byte());
            }
        };

        let end = offset + header.record_len();
        if end > size {
            if self.resyncing() {
                return Ok(self.skip_byte());
            }
            if self.intact_record_within(offset + 1, size)? {
                warn!(
                    offset,
                    payload_len = header.payload_len,
                    "record overruns end of file but intact records follow, resynchronising"
                );
                return Ok(self.skip_byte());
            }
            self.summary.trailing_bytes = size - offset;
            return Ok(Step::End);
        }

        let payload_offset = offset + HEADER_SIZE as u64;
        let Some(payload) = self
            .file
            .read_exact_at(payload_offset, header.payload_len as usize)?
        else {
            return Ok(Step::End);
        };
        let record = StoredRecord { header, payload };
        if self.resyncing() && !record.hash_matches() {
            return Ok(self.skip_byte());
        }

        self.offset = end;
        Ok(Step::Record(offset, record))
    }

    /// Whether a hash-valid record starts anywhere in `from..size`.
    fn intact_record_within(&self, from: u64, size: u64) -> CoreResult<bool> {
        let mut candidate = from;
        while candidate + HEADER_SIZE as u64 <= size {
            if self.intact_at(candidate, size)? {
                return Ok(true);
            }
            candidate += 1;
        }
        Ok(false)
    }

    fn intact_at(&self, offset: u64, size: u64) -> CoreResult<bool> {
        let Some(bytes) = self.file.read_exact_at(offset, HEADER_SIZE)? else {
            return Ok(false);
        };
        let Ok(header) = RecordHeader::decode(&bytes, offset, self.file.max_payload()) else {
            return Ok(false);
        };
        if offset + header.record_len() > size {
            return Ok(false);
        }
        let Some(payload) = self
            .file
            .read_exact_at(offset + HEADER_SIZE as u64, header.payload_len as usize)?
        else {
            return Ok(false);
        };
        Ok(StoredRecord { header, payload }.hash_matches())
    }

    fn close_region(&mut self, until: u64) -> Option<ScanEntry> {
        let start = self.corrupt_start.take()?;
        self.summary.corrupt_regions += 1;
        Some(ScanEntry::Corrupt {
            offset: start,
            len: until - start,
        })
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = CoreResult<ScanEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.pending.take() {
            return Some(Ok(entry));
        }
        if self.done {
            return None;
        }
        let size = match self.size {
            Some(size) => size,
            None => match self.file.size() {
                Ok(size) => *self.size.insert(size),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            },
        };

        loop {
            match self.step(size) {
                Ok(Step::Skip) => continue,
                Ok(Step::Record(offset, record)) => {
                    self.summary.records += 1;
                    let entry = ScanEntry::Record { offset, record };
                    if let Some(region) = self.close_region(offset) {
                        self.pending = Some(entry);
                        return Some(Ok(region));
                    }
                    return Some(Ok(entry));
                }
                Ok(Step::End) => {
                    self.done = true;
                    return self.close_region(size).map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

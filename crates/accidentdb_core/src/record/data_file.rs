//! The append-only data file.

use super::codec::{RecordHeader, StoredRecord, HEADER_SIZE, LIVE_OFFSET};
use super::scan::RecordScanner;
use crate::error::{CoreError, CoreResult};
use accidentdb_storage::{FileBackend, StorageBackend, StorageError};
use std::path::Path;

/// Concatenation of stored records with no global header.
///
/// Writers only append at the tail or flip the `live` byte of a known
/// header. Every write is followed by a flush and fsync unless the
/// `_unsynced` variant is used, in which case the caller must call
/// [`DataFile::sync`].
pub struct DataFile {
    backend: Box<dyn StorageBackend>,
    max_payload: u32,
}

impl std::fmt::Debug for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFile")
            .field("max_payload", &self.max_payload)
            .finish_non_exhaustive()
    }
}

impl DataFile {
    /// Wraps a storage backend.
    pub fn new(backend: Box<dyn StorageBackend>, max_payload: u32) -> Self {
        Self {
            backend,
            max_payload,
        }
    }

    /// Opens (or creates) the data file at `path`.
    pub fn open(path: &Path, max_payload: u32) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        Ok(Self::new(Box::new(backend), max_payload))
    }

    /// Maximum payload length accepted and expected by this file.
    #[must_use]
    pub fn max_payload(&self) -> u32 {
        self.max_payload
    }

    /// Current length in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Appends a record as one contiguous write and fsyncs.
    ///
    /// Returns the offset of the record header.
    pub fn append(&mut self, record: &StoredRecord) -> CoreResult<u64> {
        let offset = self.append_unsynced(record)?;
        self.backend.sync()?;
        Ok(offset)
    }

    /// Appends a record without syncing.
    pub fn append_unsynced(&mut self, record: &StoredRecord) -> CoreResult<u64> {
        self.check_payload(record)?;
        Ok(self.backend.append(&record.encode())?)
    }

    /// Flushes and fsyncs pending writes.
    pub fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }

    /// Flips the header at `offset` to tombstone with a one-byte write.
    pub fn mark_tombstone(&mut self, offset: u64) -> CoreResult<()> {
        self.write_live_byte(offset, 0x00)
    }

    /// Flips the header at `offset` back to live.
    pub fn mark_live(&mut self, offset: u64) -> CoreResult<()> {
        self.write_live_byte(offset, 0x01)
    }

    fn write_live_byte(&mut self, offset: u64, value: u8) -> CoreResult<()> {
        self.backend.write_at(offset + LIVE_OFFSET, &[value])?;
        self.backend.sync()?;
        Ok(())
    }

    /// Reads the header at `offset`.
    ///
    /// Returns `None` if the file ends before a full header.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if the bytes are not a valid header.
    pub fn read_header(&self, offset: u64) -> CoreResult<Option<RecordHeader>> {
        let Some(bytes) = self.read_exact_at(offset, HEADER_SIZE)? else {
            return Ok(None);
        };
        RecordHeader::decode(&bytes, offset, self.max_payload).map(Some)
    }

    /// Reads the full record at `offset`.
    ///
    /// Returns `None` if the header or payload is cut short by the end of
    /// the file.
    pub fn read_record(&self, offset: u64) -> CoreResult<Option<StoredRecord>> {
        let Some(header) = self.read_header(offset)? else {
            return Ok(None);
        };
        let payload_offset = offset + HEADER_SIZE as u64;
        let Some(payload) = self.read_exact_at(payload_offset, header.payload_len as usize)? else {
            return Ok(None);
        };
        Ok(Some(StoredRecord { header, payload }))
    }

    /// Reads `len` bytes, mapping a short read to `None`.
    pub(crate) fn read_exact_at(&self, offset: u64, len: usize) -> CoreResult<Option<Vec<u8>>> {
        match self.backend.read_at(offset, len) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_short_read() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Walks every record from offset 0.
    #[must_use]
    pub fn scan(&self) -> RecordScanner<'_> {
        RecordScanner::new(self)
    }

    /// Truncates the file to `len` bytes and fsyncs.
    pub fn truncate(&mut self, len: u64) -> CoreResult<()> {
        match self.backend.truncate(len) {
            Ok(()) => Ok(()),
            Err(StorageError::TruncateBeyondEnd { requested, size }) => Err(CoreError::invalid(
                "length",
                format!("cannot truncate {size}-byte file to {requested} bytes"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn check_payload(&self, record: &StoredRecord) -> CoreResult<()> {
        let len = record.payload.len();
        if len > self.max_payload as usize {
            return Err(CoreError::invalid(
                "payload",
                format!("{len} bytes exceeds maximum of {}", self.max_payload),
            ));
        }
        if len != record.header.payload_len as usize {
            return Err(CoreError::invalid(
                "payload",
                format!(
                    "header declares {} bytes, payload has {len}",
                    record.header.payload_len
                ),
            ));
        }
        Ok(())
    }
}

//! Stored record encoding.
//!
//! ```text
//! offset  width  field
//!      0      8  id            u64 LE
//!      8      8  timestamp     f64 LE, seconds since the epoch
//!     16     32  content_hash  SHA-256 of the payload
//!     48      1  live          0x00 tombstone, 0x01 live
//!     49      4  payload_len   u32 LE
//!     53      n  payload
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::RecordId;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Size of the fixed prefix preceding every payload.
pub const HEADER_SIZE: usize = 53;
/// Offset of the `live` byte within a header.
pub const LIVE_OFFSET: u64 = 48;

const TOMBSTONE: u8 = 0x00;
const LIVE: u8 = 0x01;

/// SHA-256 digest of a payload.
pub type ContentHash = [u8; 32];

/// Computes the content hash of a payload.
#[must_use]
pub fn content_hash(payload: &[u8]) -> ContentHash {
    Sha256::digest(payload).into()
}

/// Current time as fractional seconds since the epoch.
#[must_use]
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// Fixed-size prefix of a stored record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    /// Record id.
    pub id: RecordId,
    /// Write time.
    pub timestamp: f64,
    /// SHA-256 of the payload.
    pub content_hash: ContentHash,
    /// `false` once tombstoned.
    pub live: bool,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl RecordHeader {
    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.id.as_u64().to_le_bytes());
        buf[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[16..48].copy_from_slice(&self.content_hash);
        buf[48] = if self.live { LIVE } else { TOMBSTONE };
        buf[49..53].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Decodes a header read at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if the bytes cannot be a header
    /// written by this store: a `live` byte other than 0 or 1, a payload
    /// longer than `max_payload`, or a timestamp that is not a finite,
    /// non-negative number.
    pub fn decode(bytes: &[u8], offset: u64, max_payload: u32) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CoreError::corrupt_record(
                offset,
                format!("header needs {HEADER_SIZE} bytes, got {}", bytes.len()),
            ));
        }
        let id = u64::from_le_bytes(array8(&bytes[0..8]));
        let timestamp = f64::from_le_bytes(array8(&bytes[8..16]));
        let mut content_hash = [0u8; 32];
        content_hash.copy_from_slice(&bytes[16..48]);
        let live = match bytes[48] {
            LIVE => true,
            TOMBSTONE => false,
            other => {
                return Err(CoreError::corrupt_record(
                    offset,
                    format!("invalid live byte 0x{other:02x}"),
                ))
            }
        };
        let payload_len = u32::from_le_bytes([bytes[49], bytes[50], bytes[51], bytes[52]]);

        if payload_len > max_payload {
            return Err(CoreError::corrupt_record(
                offset,
                format!("payload_len {payload_len} exceeds maximum {max_payload}"),
            ));
        }
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(CoreError::corrupt_record(
                offset,
                format!("implausible timestamp {timestamp}"),
            ));
        }

        Ok(Self {
            id: RecordId::new(id),
            timestamp,
            content_hash,
            live,
            payload_len,
        })
    }

    /// Total encoded length of the record this header starts.
    #[must_use]
    pub fn record_len(&self) -> u64 {
        HEADER_SIZE as u64 + u64::from(self.payload_len)
    }
}

fn array8(slice: &[u8]) -> [u8; 8] {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(slice);
    arr
}

/// A header together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// The header.
    pub header: RecordHeader,
    /// Canonical payload bytes.
    pub payload: Vec<u8>,
}

impl StoredRecord {
    /// Builds a live record stamped with the current time.
    ///
    /// Payloads longer than `u32::MAX` get a clamped length and are
    /// rejected by [`crate::record::DataFile::append`].
    #[must_use]
    pub fn live(id: RecordId, payload: Vec<u8>) -> Self {
        Self {
            header: RecordHeader {
                id,
                timestamp: now_timestamp(),
                content_hash: content_hash(&payload),
                live: true,
                payload_len: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            },
            payload,
        }
    }

    /// Encodes header and payload as one contiguous buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Whether the stored hash matches the payload.
    #[must_use]
    pub fn hash_matches(&self) -> bool {
        content_hash(&self.payload) == self.header.content_hash
    }
}

//! On-disk records: codec, data file, scanning and compaction.

mod codec;
mod compaction;
mod data_file;
mod scan;

pub use codec::{
    content_hash, now_timestamp, ContentHash, RecordHeader, StoredRecord, HEADER_SIZE,
    LIVE_OFFSET,
};
pub use compaction::{CompactionResult, Compactor};
pub use data_file::DataFile;
pub use scan::{RecordScanner, ScanEntry, ScanSummary};

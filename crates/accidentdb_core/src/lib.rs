//! # accidentdb core
//!
//! A single-directory record store for traffic accident reports.
//!
//! This crate provides:
//! - An append-only data file of checksummed records with in-place tombstones
//! - A primary index (id to offset) persisted as a sidecar and rebuildable
//!   from the data file at any time
//! - A monotonic id counter that never reuses ids
//! - An advisory file lock serializing every operation across processes
//! - Snapshots, restore, compaction and integrity verification
//! - Bulk import of delimited text and export to CSV or JSON
//!
//! ## Example
//!
//! ```rust
//! use accidentdb_core::{Config, Store, TrafficAccident};
//!
//! let temp = tempfile::tempdir().unwrap();
//! let store = Store::open(Config::new(temp.path())).unwrap();
//!
//! let mut accident = TrafficAccident::new("07/14/2023 05:30:00 PM", "REAR END");
//! accident.num_units = 2;
//! let id = store.add(&accident).unwrap();
//!
//! let stored = store.get(id).unwrap().unwrap();
//! assert_eq!(stored, accident);
//! assert_eq!(store.count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod accident;
mod backup;
mod config;
mod counter;
mod dir;
mod error;
mod export;
mod import;
pub mod index;
mod rebuild;
pub mod record;
mod stats;
mod store;
mod types;
mod verify;

pub use accident::{TrafficAccident, FIELD_NAMES, UNKNOWN};
pub use backup::{SnapshotInfo, SnapshotManager, SNAPSHOT_PREFIX};
pub use config::{
    Config, DEFAULT_DATA_DIR, DEFAULT_DELIMITER, DEFAULT_IMPORT_MAX_BYTES,
    DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_PAYLOAD_BYTES,
};
pub use counter::IdCounter;
pub use dir::{LockGuard, StoreDir, STORE_NAME};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use import::{ImportReport, Importer, RejectedRow, DEFAULT_BATCH_SIZE};
pub use index::PrimaryIndex;
pub use rebuild::RebuildReport;
pub use record::{CompactionResult, HEADER_SIZE};
pub use stats::{OperationSnapshot, StoreStats};
pub use store::Store;
pub use types::RecordId;
pub use verify::VerifyReport;

//! Store statistics.
//!
//! [`OperationStats`] counts operations performed through one `Store`
//! handle; [`StoreStats`] combines a snapshot of those counters with the
//! on-disk figures gathered by `Store::stats`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-handle operation counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct OperationStats {
    reads: AtomicU64,
    adds: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    rebuilds: AtomicU64,
    compactions: AtomicU64,
    bytes_written: AtomicU64,
    errors: AtomicU64,
}

impl OperationStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_add(&self, bytes: u64) {
        self.adds.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_adds(&self, count: u64, bytes: u64) {
        self.adds.fetch_add(count, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self, bytes: u64) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rebuild(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            adds: self.adds.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`OperationStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OperationSnapshot {
    /// Point reads.
    pub reads: u64,
    /// Records added.
    pub adds: u64,
    /// Records updated.
    pub updates: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Index rebuilds, including the one at open.
    pub rebuilds: u64,
    /// Compactions.
    pub compactions: u64,
    /// Bytes appended to the data file.
    pub bytes_written: u64,
    /// Failed operations.
    pub errors: u64,
}

/// Figures reported by `Store::stats`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    /// Live records (index size).
    pub live_records: usize,
    /// Tombstoned records still in the data file.
    pub tombstones: usize,
    /// Data file size in bytes.
    pub data_bytes: u64,
    /// Entries in the in-memory index.
    pub index_entries: usize,
    /// Current counter value.
    pub counter: u64,
    /// Complete snapshots on disk.
    pub snapshots: usize,
    /// Operation counters of this handle.
    pub operations: OperationSnapshot,
}

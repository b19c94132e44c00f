//! Store facade.

use crate::accident::TrafficAccident;
use crate::backup::{SnapshotInfo, SnapshotManager};
use crate::config::Config;
use crate::counter::IdCounter;
use crate::dir::{DiskStamp, StoreDir};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::index::PrimaryIndex;
use crate::rebuild::{rebuild, RebuildReport};
use crate::record::{CompactionResult, Compactor, DataFile, ScanEntry, StoredRecord};
use crate::stats::{OperationStats, StoreStats};
use crate::types::RecordId;
use crate::verify::{verify, VerifyReport};
use accidentdb_storage::InMemoryBackend;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Files behind a store, guarded together.
struct StoreState {
    data: DataFile,
    index: PrimaryIndex,
    counter: IdCounter,
    /// Files as they looked when this handle last released the lock.
    seen: Option<DiskStamp>,
    /// Set while `data` is not the file on disk; cleared by a full reload.
    stale: bool,
}

/// Handle to a traffic accident store.
///
/// A store is a directory holding an append-only data file, a primary
/// index sidecar and an id counter. Every operation that touches those
/// files runs under an in-process mutex and the directory's advisory
/// lock, so operations from threads and processes are serialized.
///
/// Several handles may share a directory. Each operation compares the
/// files with what this handle last saw and reloads them if another
/// handle wrote in between, so ids are never handed out twice and a read
/// sees every write that finished before it started.
///
/// # Example
///
/// ```
/// use accidentdb_core::{Config, Store, TrafficAccident};
///
/// let temp = tempfile::tempdir().unwrap();
/// let store = Store::open(Config::new(temp.path())).unwrap();
///
/// let id = store.add(&TrafficAccident::new("2023-07-14", "REAR END")).unwrap();
/// assert_eq!(id.as_u64(), 1);
/// assert_eq!(store.get(id).unwrap().unwrap().crash_type, "REAR END");
///
/// assert!(store.delete(id).unwrap());
/// assert!(store.get(id).unwrap().is_none());
/// ```
pub struct Store {
    config: Config,
    dir: StoreDir,
    snapshots: SnapshotManager,
    state: Mutex<StoreState>,
    stats: OperationStats,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.dir.path())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens the store described by `config`, creating the directory and
    /// files if missing.
    ///
    /// Opening always rebuilds the index from the data file, rewrites the
    /// sidecar and raises the counter to the largest id found. An incomplete
    /// trailing record left by a crash is cut off.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a rejected configuration,
    /// [`CoreError::Busy`] if the lock is held elsewhere past the timeout,
    /// or an I/O error.
    pub fn open(config: Config) -> CoreResult<Self> {
        config.validate()?;
        let dir = StoreDir::open(&config.data_dir)?;
        let snapshots = SnapshotManager::new(dir.backups_dir(), dir.artefacts(), config.max_backups);
        let stats = OperationStats::new();

        let state = {
            let _guard = dir.lock(config.lock_timeout())?;
            let mut state = StoreState {
                data: DataFile::open(&dir.data_path(), config.payload_limit())?,
                index: PrimaryIndex::load(&dir.index_path())?,
                counter: IdCounter::load(&dir.counter_path())?,
                seen: None,
                stale: false,
            };
            let report = rebuild(&mut state.data, &mut state.index, &mut state.counter)?;
            stats.record_rebuild();
            if report.index_changed {
                info!("index sidecar was stale and has been rewritten");
            }
            state.seen = Some(dir.stamp()?);
            state
        };

        info!(
            path = %dir.path().display(),
            records = state.index.len(),
            counter = state.counter.peek(),
            "store opened"
        );
        Ok(Self {
            config,
            dir,
            snapshots,
            state: Mutex::new(state),
            stats,
        })
    }

    /// Opens a store at `path` with default settings.
    pub fn open_path(path: impl Into<PathBuf>) -> CoreResult<Self> {
        Self::open(Config::new(path))
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Paths of the data file, index sidecar and counter file.
    #[must_use]
    pub fn artefacts(&self) -> [PathBuf; 3] {
        self.dir.artefacts()
    }

    // === Locking ===

    /// Runs `f` with the state mutex and the advisory lock held, after
    /// catching up with writes made through other handles.
    fn locked<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut StoreState) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let start = Instant::now();
        let timeout = self.config.lock_timeout();
        let result = match self.state.try_lock_for(timeout) {
            Some(mut state) => {
                let remaining = timeout.saturating_sub(start.elapsed());
                self.dir.lock(remaining).and_then(|_guard| {
                    self.catch_up(&mut state)?;
                    let result = f(&mut state);
                    state.seen = if state.stale {
                        None
                    } else {
                        self.dir.stamp().ok()
                    };
                    result
                })
            }
            None => Err(CoreError::Busy {
                waited_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        };
        self.observe(op, result)
    }

    /// Reads in-memory state once it is current. If the lock cannot be
    /// taken the handle's last known state is used.
    fn view<T>(&self, op: &'static str, read: impl Fn(&StoreState) -> T) -> T {
        match self.locked(op, |state| Ok(read(&*state))) {
            Ok(value) => value,
            Err(_) => {
                let state = self.state.lock();
                read(&*state)
            }
        }
    }

    /// Reloads the files if they changed since this handle last held the
    /// lock, or if a previous reload did not complete.
    fn catch_up(&self, state: &mut StoreState) -> CoreResult<()> {
        if !state.stale {
            let current = self.dir.stamp()?;
            if state.seen == Some(current) {
                return Ok(());
            }
            debug!(path = %self.dir.path().display(), "store changed on disk, reloading");
        }
        self.reload(state).map(|_| ())
    }

    /// Reopens the data file, reloads the counter and rebuilds the index.
    ///
    /// Until this succeeds the state stays marked stale and every
    /// operation retries it first.
    fn reload(&self, state: &mut StoreState) -> CoreResult<RebuildReport> {
        state.stale = true;
        state.data = DataFile::open(&self.dir.data_path(), self.config.payload_limit())?;
        state.counter = IdCounter::load(&self.dir.counter_path())?;
        let report = self.rebuild_state(state)?;
        state.stale = false;
        Ok(report)
    }

    /// Logs and counts a failed operation.
    fn observe<T>(&self, op: &'static str, result: CoreResult<T>) -> CoreResult<T> {
        if let Err(e) = &result {
            self.stats.record_error();
            match e.offset() {
                Some(offset) => warn!(op, kind = %e.kind(), offset, error = %e, "operation failed"),
                None => warn!(op, kind = %e.kind(), error = %e, "operation failed"),
            }
        }
        result
    }

    /// Validates a record and encodes its payload within the size limit.
    fn prepare(&self, record: &TrafficAccident) -> CoreResult<Vec<u8>> {
        record.validate()?;
        let payload = record.to_payload()?;
        if payload.len() as u64 > self.config.max_payload_bytes {
            return Err(CoreError::invalid(
                "payload",
                format!(
                    "{} bytes exceeds maximum of {}",
                    payload.len(),
                    self.config.max_payload_bytes
                ),
            ));
        }
        Ok(payload)
    }

    /// Whether the header at `offset` is live and carries `id`.
    fn header_matches(state: &StoreState, id: RecordId, offset: u64) -> CoreResult<bool> {
        match state.data.read_header(offset) {
            Ok(Some(header)) => Ok(header.live && header.id == id),
            Ok(None) => Ok(false),
            Err(e) if e.kind() == ErrorKind::CorruptRecord => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn rebuild_state(&self, state: &mut StoreState) -> CoreResult<RebuildReport> {
        let report = rebuild(&mut state.data, &mut state.index, &mut state.counter)?;
        self.stats.record_rebuild();
        Ok(report)
    }

    fn repair_mismatch(
        &self,
        state: &mut StoreState,
        op: &'static str,
        id: RecordId,
        offset: u64,
    ) -> CoreResult<()> {
        warn!(op, %id, offset, "index entry does not match data file, rebuilding");
        self.rebuild_state(state).map(|_| ())
    }

    /// Reads the live record at `offset`, or `None` if the file disagrees
    /// with the index.
    fn read_live(
        state: &StoreState,
        id: RecordId,
        offset: u64,
        verify_hash: bool,
    ) -> CoreResult<Option<TrafficAccident>> {
        let Some(stored) = state.data.read_record(offset)? else {
            return Ok(None);
        };
        if !stored.header.live || stored.header.id != id {
            return Ok(None);
        }
        if verify_hash && !stored.hash_matches() {
            return Err(CoreError::corrupt_record(offset, "content hash mismatch"));
        }
        TrafficAccident::from_payload(&stored.payload, offset).map(Some)
    }

    // === Record operations ===

    /// Adds a record under a freshly allocated id.
    ///
    /// # Errors
    ///
    /// [`CoreError::Invalid`] if validation fails, [`CoreError::Busy`] on
    /// lock timeout, or an I/O error.
    pub fn add(&self, record: &TrafficAccident) -> CoreResult<RecordId> {
        let payload = self.observe("add", self.prepare(record))?;
        let len = payload.len() as u64;
        let id = self.locked("add", |state| {
            let id = state.counter.allocate()?;
            let offset = state.data.append(&StoredRecord::live(id, payload))?;
            state.index.put(id, offset);
            if let Err(e) = state.index.flush() {
                state.index.remove(id);
                if let Err(undo) = state.data.mark_tombstone(offset) {
                    warn!(%id, offset, error = %undo, "could not roll back add");
                }
                return Err(e);
            }
            info!(op = "add", %id, offset, outcome = "ok");
            Ok(id)
        })?;
        self.stats.record_add(len);
        Ok(id)
    }

    /// Adds several records with one lock acquisition, one data file sync
    /// and one index flush.
    ///
    /// Every record is validated first; if any fails nothing is written.
    /// Ids are assigned in input order.
    pub fn add_many(&self, records: &[TrafficAccident]) -> CoreResult<Vec<RecordId>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let payloads = self.observe(
            "add_many",
            records
                .iter()
                .map(|record| self.prepare(record))
                .collect::<CoreResult<Vec<_>>>(),
        )?;
        let bytes: u64 = payloads.iter().map(|p| p.len() as u64).sum();

        let ids = self.locked("add_many", |state| {
            let ids = state.counter.allocate_many(payloads.len())?;
            let mut offsets = Vec::with_capacity(ids.len());
            let mut failure = None;
            for (&id, payload) in ids.iter().zip(payloads) {
                match state.data.append_unsynced(&StoredRecord::live(id, payload)) {
                    Ok(offset) => offsets.push(offset),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if failure.is_none() {
                if let Err(e) = state.data.sync() {
                    failure = Some(e);
                }
            }
            if let Some(e) = failure {
                for &offset in &offsets {
                    if let Err(undo) = state.data.mark_tombstone(offset) {
                        warn!(offset, error = %undo, "could not roll back batch add");
                    }
                }
                return Err(e);
            }

            for (&id, &offset) in ids.iter().zip(&offsets) {
                state.index.put(id, offset);
            }
            state.index.flush()?;
            info!(
                op = "add_many",
                count = ids.len(),
                first_id = %ids[0],
                outcome = "ok"
            );
            Ok(ids)
        })?;
        self.stats.record_adds(ids.len() as u64, bytes);
        Ok(ids)
    }

    /// Returns the record stored under `id`, without verifying its hash.
    ///
    /// Returns `None` if the id is not indexed. If the index disagrees with
    /// the data file, the inconsistency is logged, the index is rebuilt and
    /// `None` is returned.
    pub fn get(&self, id: RecordId) -> CoreResult<Option<TrafficAccident>> {
        self.get_inner("get", id, false)
    }

    /// Like [`Store::get`], but verifies the content hash.
    ///
    /// # Errors
    ///
    /// [`CoreError::CorruptRecord`] with the record's offset on a mismatch.
    pub fn get_verified(&self, id: RecordId) -> CoreResult<Option<TrafficAccident>> {
        self.get_inner("get_verified", id, true)
    }

    /// Like [`Store::get`], but absence is [`CoreError::NotFound`].
    pub fn fetch(&self, id: RecordId) -> CoreResult<TrafficAccident> {
        let found = self.get(id)?;
        self.observe("fetch", found.ok_or(CoreError::NotFound { id }))
    }

    fn get_inner(
        &self,
        op: &'static str,
        id: RecordId,
        verify_hash: bool,
    ) -> CoreResult<Option<TrafficAccident>> {
        self.stats.record_read();
        self.locked(op, |state| {
            let Some(offset) = state.index.get(id) else {
                return Ok(None);
            };
            match Self::read_live(state, id, offset, verify_hash)? {
                Some(record) => Ok(Some(record)),
                None => {
                    self.repair_mismatch(state, op, id, offset)?;
                    Ok(None)
                }
            }
        })
    }

    /// Whether `id` is live.
    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.view("contains", |state| state.index.contains(id))
    }

    /// Replaces the record stored under `id`, keeping the id.
    ///
    /// Returns `false` if the id is absent. The old copy is tombstoned and
    /// the new one appended at the tail.
    ///
    /// # Errors
    ///
    /// [`CoreError::Invalid`] if `record` fails validation. If the append
    /// fails after the tombstone was written, the old copy is flipped back
    /// to live when possible.
    pub fn update(&self, id: RecordId, record: &TrafficAccident) -> CoreResult<bool> {
        let updated = self.locked("update", |state| {
            let Some(old) = state.index.get(id) else {
                info!(op = "update", %id, outcome = "absent");
                return Ok(None);
            };
            let payload = self.prepare(record)?;
            if !Self::header_matches(state, id, old)? {
                self.repair_mismatch(state, "update", id, old)?;
                return Ok(None);
            }

            let len = payload.len() as u64;
            state.data.mark_tombstone(old)?;
            let offset = match state.data.append(&StoredRecord::live(id, payload)) {
                Ok(offset) => offset,
                Err(e) => {
                    if let Err(undo) = state.data.mark_live(old) {
                        warn!(%id, offset = old, error = %undo, "old copy lost after failed update");
                        state.index.remove(id);
                        state.index.flush()?;
                    }
                    return Err(e);
                }
            };
            state.index.put(id, offset);
            state.index.flush()?;
            info!(op = "update", %id, offset, outcome = "ok");
            Ok(Some(len))
        })?;

        match updated {
            Some(len) => {
                self.stats.record_update(len);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tombstones the record stored under `id`.
    ///
    /// Returns `false` if the id is absent.
    pub fn delete(&self, id: RecordId) -> CoreResult<bool> {
        let deleted = self.locked("delete", |state| {
            let Some(offset) = state.index.get(id) else {
                info!(op = "delete", %id, outcome = "absent");
                return Ok(false);
            };
            if !Self::header_matches(state, id, offset)? {
                self.repair_mismatch(state, "delete", id, offset)?;
                return Ok(false);
            }
            state.data.mark_tombstone(offset)?;
            state.index.remove(id);
            state.index.flush()?;
            info!(op = "delete", %id, offset, outcome = "ok");
            Ok(true)
        })?;
        if deleted {
            self.stats.record_delete();
        }
        Ok(deleted)
    }

    /// Number of live records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.view("count", |state| state.index.len())
    }

    /// Live ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.view("ids", |state| state.index.keys_sorted())
    }

    /// Current counter value: the highest id ever allocated.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.view("counter", |state| state.counter.peek())
    }

    // === Scans ===

    /// Live records in ascending id order.
    ///
    /// Records are read under the lock and returned as an owned iterator,
    /// so the lock is not held while the caller consumes it.
    pub fn scan_live(
        &self,
    ) -> CoreResult<impl Iterator<Item = (RecordId, TrafficAccident)>> {
        self.scan_range("scan_live", 0, usize::MAX)
            .map(Vec::into_iter)
    }

    /// Up to `limit` live records in id order, after skipping `offset`.
    pub fn scan_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> CoreResult<Vec<(RecordId, TrafficAccident)>> {
        self.scan_range("scan_page", offset, limit)
    }

    fn scan_range(
        &self,
        op: &'static str,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<(RecordId, TrafficAccident)>> {
        self.locked(op, |state| {
            // a mismatch triggers one rebuild, after which the index is
            // derived from the file and must agree with it
            for _ in 0..2 {
                let wanted: Vec<_> = state.index.iter().skip(skip).take(limit).collect();
                let mut records = Vec::with_capacity(wanted.len());
                let mut mismatch = None;
                for (id, offset) in wanted {
                    match Self::read_live(state, id, offset, false)? {
                        Some(record) => records.push((id, record)),
                        None => {
                            mismatch = Some((id, offset));
                            break;
                        }
                    }
                }
                match mismatch {
                    None => return Ok(records),
                    Some((id, offset)) => self.repair_mismatch(state, op, id, offset)?,
                }
            }
            Err(CoreError::corrupt_file(
                "index disagrees with data file after rebuild",
            ))
        })
    }

    // === Maintenance ===

    /// Rebuilds the index from a full scan of the data file.
    pub fn rebuild(&self) -> CoreResult<RebuildReport> {
        self.locked("rebuild", |state| self.rebuild_state(state))
    }

    /// Rewrites the data file keeping only live records, in id order and
    /// under their existing ids. The counter is not lowered.
    ///
    /// # Errors
    ///
    /// [`CoreError::CorruptFile`] if the data file has corrupt regions.
    pub fn compact(&self) -> CoreResult<CompactionResult> {
        let result = self.locked("compact", |state| {
            let data_path = self.dir.data_path();
            let mut temp_name = data_path.as_os_str().to_owned();
            temp_name.push(".compact");
            let temp_path = PathBuf::from(temp_name);

            let result = Compactor::new().compact_into(&state.data, &state.index, &temp_path)?;

            // release the handle before replacing the file underneath it
            state.data = DataFile::new(Box::new(InMemoryBackend::new()), state.data.max_payload());
            state.stale = true;
            fs::rename(&temp_path, &data_path)?;
            self.dir.sync_directory()?;

            self.reload(state)?;
            info!(
                op = "compact",
                input = result.input_records,
                output = result.output_records,
                tombstones_removed = result.tombstones_removed,
                bytes_saved = result.bytes_saved(),
                outcome = "ok"
            );
            Ok(result)
        })?;
        self.stats.record_compaction();
        Ok(result)
    }

    /// Empties the store: truncates the data file and sidecar and resets
    /// the counter to zero.
    pub fn clear(&self) -> CoreResult<()> {
        self.locked("clear", |state| {
            state.data.truncate(0)?;
            state.index.clear();
            state.index.flush()?;
            state.counter.reset()?;
            info!(op = "clear", outcome = "ok");
            Ok(())
        })
    }

    /// Walks the whole data file and reports inconsistencies. Never mutates.
    pub fn verify(&self) -> CoreResult<VerifyReport> {
        self.locked("verify", |state| {
            verify(&state.data, &state.index, &state.counter)
        })
    }

    /// On-disk figures plus this handle's operation counters.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        self.locked("stats", |state| {
            let snapshots = self.snapshots.list()?.len();
            let mut tombstones = 0;
            for entry in state.data.scan() {
                if let ScanEntry::Record { record, .. } = entry? {
                    if !record.header.live {
                        tombstones += 1;
                    }
                }
            }
            Ok(StoreStats {
                live_records: state.index.len(),
                tombstones,
                data_bytes: state.data.size()?,
                index_entries: state.index.len(),
                counter: state.counter.peek(),
                snapshots,
                operations: self.stats.snapshot(),
            })
        })
    }

    // === Backup / restore ===

    /// Snapshots the data file, sidecar and counter, then applies retention.
    pub fn backup(&self) -> CoreResult<SnapshotInfo> {
        self.locked("backup", |state| {
            state.data.sync()?;
            state.index.flush()?;
            let snapshot = self.snapshots.create()?;
            info!(op = "backup", snapshot = %snapshot.name, outcome = "ok");
            Ok(snapshot)
        })
    }

    /// Complete snapshots, newest first.
    pub fn list_backups(&self) -> CoreResult<Vec<SnapshotInfo>> {
        self.observe("list_backups", self.snapshots.list())
    }

    /// Replaces the store's files with snapshot `name` and reloads.
    ///
    /// # Errors
    ///
    /// [`CoreError::SnapshotNotFound`] if no complete snapshot has that name.
    pub fn restore(&self, name: &str) -> CoreResult<SnapshotInfo> {
        self.locked("restore", |state| {
            let snapshot = self.snapshots.find(name)?;
            state.data = DataFile::new(Box::new(InMemoryBackend::new()), state.data.max_payload());
            state.stale = true;
            self.snapshots.restore(&snapshot.name)?;
            self.reload(state)?;
            info!(
                op = "restore",
                snapshot = %snapshot.name,
                records = state.index.len(),
                outcome = "ok"
            );
            Ok(snapshot)
        })
    }

    /// Restores the newest complete snapshot.
    pub fn restore_latest(&self) -> CoreResult<SnapshotInfo> {
        let latest = self.observe("restore", self.snapshots.latest())?;
        self.restore(&latest.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn accident(n: u32) -> TrafficAccident {
        TrafficAccident {
            num_units: n,
            crash_hour: (n % 24) as u8,
            ..TrafficAccident::new("2023-07-14", format!("TYPE {n}"))
        }
    }

    fn open(dir: &Path) -> Store {
        Store::open(Config::new(dir).lock_timeout_ms(200)).unwrap()
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        assert_eq!(store.add(&accident(1)).unwrap(), RecordId::new(1));
        assert_eq!(store.add(&accident(2)).unwrap(), RecordId::new(2));
        assert_eq!(store.counter(), 2);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn invalid_record_is_rejected_without_allocating() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let err = store.add(&TrafficAccident::new("", "X")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(store.counter(), 0);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn update_keeps_id_and_tombstones_old_copy() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let id = store.add(&accident(1)).unwrap();
        let changed = TrafficAccident {
            weather_condition: "SNOW".into(),
            ..accident(1)
        };

        assert!(store.update(id, &changed).unwrap());
        assert_eq!(store.get(id).unwrap().unwrap(), changed);
        assert_eq!(store.counter(), 1);
        assert_eq!(store.stats().unwrap().tombstones, 1);
    }

    #[test]
    fn update_absent_id_returns_false_even_for_invalid_record() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        assert!(!store.update(RecordId::new(9), &TrafficAccident::default()).unwrap());
    }

    #[test]
    fn update_validates_present_id() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let id = store.add(&accident(1)).unwrap();
        let err = store.update(id, &TrafficAccident::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(store.get(id).unwrap().unwrap(), accident(1));
    }

    #[test]
    fn delete_twice_returns_false() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let id = store.add(&accident(1)).unwrap();
        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert!(store.get(id).unwrap().is_none());
        assert!(matches!(store.fetch(id), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn reopen_sees_same_state() {
        let temp = tempdir().unwrap();
        {
            let store = open(temp.path());
            store.add(&accident(1)).unwrap();
            let id = store.add(&accident(2)).unwrap();
            store.delete(id).unwrap();
        }
        let store = open(temp.path());
        assert_eq!(store.ids(), vec![RecordId::new(1)]);
        assert_eq!(store.counter(), 2);
        assert_eq!(store.add(&accident(3)).unwrap(), RecordId::new(3));
    }

    #[test]
    fn scan_page_skips_and_limits() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        for n in 0..5 {
            store.add(&accident(n)).unwrap();
        }
        let page: Vec<_> = store
            .scan_page(1, 2)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.as_u64())
            .collect();
        assert_eq!(page, vec![2, 3]);
        assert!(store.scan_page(10, 2).unwrap().is_empty());
    }

    #[test]
    fn add_many_assigns_consecutive_ids() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        store.add(&accident(0)).unwrap();
        let ids = store
            .add_many(&[accident(1), accident(2), accident(3)])
            .unwrap();
        assert_eq!(
            ids,
            vec![RecordId::new(2), RecordId::new(3), RecordId::new(4)]
        );
        assert_eq!(store.get(RecordId::new(3)).unwrap().unwrap(), accident(2));
    }

    #[test]
    fn add_many_is_all_or_nothing_on_validation() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let err = store
            .add_many(&[accident(1), TrafficAccident::default()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(store.count(), 0);
        assert_eq!(store.counter(), 0);
    }

    #[test]
    fn stale_index_entry_triggers_rebuild() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let id = store.add(&accident(1)).unwrap();
        {
            let mut state = store.state.lock();
            let offset = state.index.get(id).unwrap();
            state.data.mark_tombstone(offset).unwrap();
        }
        assert!(store.get(id).unwrap().is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn verified_read_detects_hash_mismatch() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let id = store.add(&accident(1)).unwrap();
        let offset = store.state.lock().index.get(id).unwrap();

        let path = store.dir.data_path();
        let mut bytes = fs::read(&path).unwrap();
        // flip the first hash byte
        bytes[16] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(store.get(id).unwrap().is_some());
        let err = store.get_verified(id).unwrap_err();
        assert_eq!(err.offset(), Some(offset));
    }

    #[test]
    fn compact_preserves_ids_and_counter() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        for n in 0..4 {
            store.add(&accident(n)).unwrap();
        }
        store.delete(RecordId::new(2)).unwrap();
        store.delete(RecordId::new(4)).unwrap();
        store.update(RecordId::new(1), &accident(10)).unwrap();

        let result = store.compact().unwrap();
        assert_eq!(result.output_records, 2);
        assert_eq!(result.tombstones_removed, 3);
        assert_eq!(store.ids(), vec![RecordId::new(1), RecordId::new(3)]);
        assert_eq!(store.get(RecordId::new(1)).unwrap().unwrap(), accident(10));
        assert_eq!(store.counter(), 4);
        assert_eq!(store.add(&accident(5)).unwrap(), RecordId::new(5));
        assert!(store.verify().unwrap().is_clean());
    }

    #[test]
    fn clear_empties_everything() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        store.add(&accident(1)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.count(), 0);
        assert_eq!(store.counter(), 0);
        assert_eq!(fs::metadata(store.dir.data_path()).unwrap().len(), 0);
        assert_eq!(store.add(&accident(2)).unwrap(), RecordId::new(1));
    }

    #[test]
    fn backup_and_restore_round_trip() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        for n in 0..3 {
            store.add(&accident(n)).unwrap();
        }
        let snapshot = store.backup().unwrap();
        store.delete(RecordId::new(1)).unwrap();
        store.add(&accident(9)).unwrap();

        store.restore(&snapshot.name).unwrap();
        assert_eq!(store.count(), 3);
        assert_eq!(store.counter(), 3);
        assert_eq!(store.get(RecordId::new(1)).unwrap().unwrap(), accident(0));
        assert_eq!(store.list_backups().unwrap().len(), 1);
    }

    #[test]
    fn restore_unknown_snapshot_fails() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        assert!(matches!(
            store.restore("snapshot_missing"),
            Err(CoreError::SnapshotNotFound { .. })
        ));
        assert!(matches!(
            store.restore_latest(),
            Err(CoreError::SnapshotNotFound { .. })
        ));
    }

    #[test]
    fn second_handle_times_out_while_lock_is_held() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let other = StoreDir::open(temp.path()).unwrap();
        let _held = other.lock(std::time::Duration::from_millis(100)).unwrap();

        let err = store.add(&accident(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn handles_on_one_directory_see_each_others_writes() {
        let temp = tempdir().unwrap();
        let first = open(temp.path());
        let second = open(temp.path());

        let a = first.add(&accident(1)).unwrap();
        let b = second.add(&accident(2)).unwrap();
        assert_eq!((a.as_u64(), b.as_u64()), (1, 2));
        assert_eq!(first.get(b).unwrap().unwrap(), accident(2));
        assert_eq!(second.get(a).unwrap().unwrap(), accident(1));

        assert!(first.delete(b).unwrap());
        assert!(!second.contains(b));
        assert_eq!(second.add(&accident(3)).unwrap(), RecordId::new(3));
        assert_eq!(first.ids(), vec![a, RecordId::new(3)]);
        assert_eq!(first.counter(), 3);
    }

    #[test]
    fn compaction_by_another_handle_is_picked_up() {
        let temp = tempdir().unwrap();
        let first = open(temp.path());
        let second = open(temp.path());
        for n in 0..4 {
            first.add(&accident(n)).unwrap();
        }
        first.delete(RecordId::new(1)).unwrap();

        second.compact().unwrap();
        assert_eq!(first.get(RecordId::new(4)).unwrap().unwrap(), accident(3));
        assert_eq!(first.add(&accident(9)).unwrap(), RecordId::new(5));
        assert!(second.verify().unwrap().is_clean());
        assert_eq!(second.count(), 4);
    }

    #[test]
    fn failed_restore_blocks_operations_until_files_return() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let id = store.add(&accident(1)).unwrap();
        let snapshot = store.backup().unwrap();

        let data_path = store.dir.data_path();
        let aside = temp.path().join("aside.db");
        fs::rename(&data_path, &aside).unwrap();
        // a directory in its place makes both the restore and a reopen fail
        fs::create_dir(&data_path).unwrap();

        assert!(store.restore(&snapshot.name).is_err());
        assert_eq!(store.add(&accident(2)).unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(store.get(id).unwrap_err().kind(), ErrorKind::Io);

        fs::remove_dir(&data_path).unwrap();
        fs::rename(&aside, &data_path).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap(), accident(1));
        assert_eq!(store.ids(), vec![id]);
        assert_eq!(store.add(&accident(2)).unwrap(), RecordId::new(2));
    }

    #[test]
    fn stats_count_snapshots_under_the_lock() {
        let temp = tempdir().unwrap();
        let first = open(temp.path());
        let second = open(temp.path());
        first.add(&accident(1)).unwrap();
        second.backup().unwrap();
        second.backup().unwrap();

        let stats = first.stats().unwrap();
        assert_eq!(stats.snapshots, 2);
        assert_eq!(stats.live_records, 1);
    }

    #[test]
    fn stats_report_operations() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        let id = store.add(&accident(1)).unwrap();
        store.get(id).unwrap();
        store.backup().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.live_records, 1);
        assert_eq!(stats.counter, 1);
        assert_eq!(stats.snapshots, 1);
        assert_eq!(stats.operations.adds, 1);
        assert_eq!(stats.operations.reads, 1);
        assert!(stats.data_bytes > 0);
    }
}

//! Store directory management.
//!
//! This module handles the file system layout of a store:
//!
//! ```text
//! <data_dir>/
//! ├─ traffic_accidents.db     # Append-only data file
//! ├─ traffic_accidents.idx    # Primary index sidecar
//! ├─ traffic_accidents.ctr    # Id counter (decimal text)
//! ├─ traffic_accidents.lock   # Advisory lock
//! └─ backups/                 # Snapshots
//! ```
//!
//! Unlike a single-writer database, the lock is not held for the lifetime
//! of the store. Each operation acquires it through [`StoreDir::lock`] and
//! releases it when the returned guard is dropped, so several processes can
//! share a directory.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Base name shared by the store's files.
pub const STORE_NAME: &str = "traffic_accidents";

const DATA_EXT: &str = "db";
const INDEX_EXT: &str = "idx";
const COUNTER_EXT: &str = "ctr";
const LOCK_EXT: &str = "lock";
const BACKUPS_DIR: &str = "backups";

/// Polling interval while waiting for a contended lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Identity, length and modification time of one store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    file_id: u64,
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(meta: &Metadata) -> Self {
        Self {
            file_id: file_id(meta),
            len: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

#[cfg(unix)]
fn file_id(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> u64 {
    0
}

/// What another handle would have to change to modify the store: the data
/// file, sidecar and counter as seen through `stat`. Two equal stamps taken
/// under the lock mean nobody wrote in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DiskStamp([Option<FileStamp>; 3]);

/// Paths and advisory lock of a store directory.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    lock_file: File,
}

impl StoreDir {
    /// Opens a store directory, creating it and its `backups/` directory if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists but is not a directory, or on I/O failure.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if path.exists() && !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "data_dir is not a directory: {}",
                path.display()
            )));
        }
        fs::create_dir_all(path)?;
        fs::create_dir_all(path.join(BACKUPS_DIR))?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(format!("{STORE_NAME}.{LOCK_EXT}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the data file.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.file_path(DATA_EXT)
    }

    /// Returns the path of the index sidecar.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.file_path(INDEX_EXT)
    }

    /// Returns the path of the id counter file.
    #[must_use]
    pub fn counter_path(&self) -> PathBuf {
        self.file_path(COUNTER_EXT)
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.file_path(LOCK_EXT)
    }

    /// Returns the snapshot directory.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.path.join(BACKUPS_DIR)
    }

    /// The three artefacts captured by a snapshot, in a fixed order.
    #[must_use]
    pub fn artefacts(&self) -> [PathBuf; 3] {
        [self.data_path(), self.index_path(), self.counter_path()]
    }

    /// Stats the three artefacts. A missing file stamps as `None`.
    pub(crate) fn stamp(&self) -> CoreResult<DiskStamp> {
        let mut stamps = [None; 3];
        for (slot, path) in stamps.iter_mut().zip(self.artefacts()) {
            *slot = match fs::metadata(&path) {
                Ok(meta) => Some(FileStamp::of(&meta)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
        }
        Ok(DiskStamp(stamps))
    }

    fn file_path(&self, ext: &str) -> PathBuf {
        self.path.join(format!("{STORE_NAME}.{ext}"))
    }

    /// Acquires the exclusive advisory lock, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Busy`] if another holder keeps the lock past the
    /// timeout.
    pub fn lock(&self, timeout: Duration) -> CoreResult<LockGuard<'_>> {
        let start = Instant::now();
        let contended = fs2::lock_contended_error().raw_os_error();
        loop {
            match self.lock_file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(LockGuard {
                        file: &self.lock_file,
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock
                    || (contended.is_some() && e.raw_os_error() == contended) =>
                {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(CoreError::Busy {
                            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Syncs the directory so renames and creations inside it are durable.
    #[cfg(unix)]
    pub fn sync_directory(&self) -> CoreResult<()> {
        sync_dir(&self.path)
    }

    /// Syncs the directory so renames and creations inside it are durable.
    #[cfg(not(unix))]
    pub fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata updates
        Ok(())
    }
}

/// Holds the advisory lock until dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    file: &'a File,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            tracing::warn!(error = %e, "failed to release store lock");
        }
    }
}

/// Fsyncs a directory.
#[cfg(unix)]
pub(crate) fn sync_dir(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_path: &Path) -> CoreResult<()> {
    Ok(())
}

/// Replaces `target` with `data` atomically.
///
/// Writes a sibling temporary file, syncs it, renames it over the target
/// and syncs the parent directory. Readers see either the old or the new
/// contents, never a mix.
pub(crate) fn write_atomic(target: &Path, data: &[u8]) -> CoreResult<()> {
    let mut temp_name = target.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, target)?;
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            sync_dir(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_layout() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("store");

        let dir = StoreDir::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(dir.backups_dir().is_dir());
        assert!(dir.lock_path().exists());
        assert_eq!(dir.data_path(), root.join("traffic_accidents.db"));
        assert_eq!(dir.index_path(), root.join("traffic_accidents.idx"));
        assert_eq!(dir.counter_path(), root.join("traffic_accidents.ctr"));
    }

    #[test]
    fn open_rejects_file_path() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(StoreDir::open(&file).is_err());
    }

    #[test]
    fn lock_is_reacquirable_after_drop() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path()).unwrap();
        {
            let _guard = dir.lock(Duration::from_millis(100)).unwrap();
        }
        let _guard = dir.lock(Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn contended_lock_times_out_busy() {
        let temp = tempdir().unwrap();
        let first = StoreDir::open(temp.path()).unwrap();
        let second = StoreDir::open(temp.path()).unwrap();

        let _held = first.lock(Duration::from_millis(100)).unwrap();
        let start = Instant::now();
        let err = second.lock(Duration::from_millis(60)).unwrap_err();
        assert!(matches!(err, CoreError::Busy { waited_ms } if waited_ms >= 60));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn stamp_changes_when_an_artefact_is_rewritten() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path()).unwrap();
        let empty = dir.stamp().unwrap();
        assert_eq!(empty, dir.stamp().unwrap());

        write_atomic(&dir.counter_path(), b"1").unwrap();
        let counted = dir.stamp().unwrap();
        assert_ne!(counted, empty);

        fs::write(dir.data_path(), b"record").unwrap();
        assert_ne!(dir.stamp().unwrap(), counted);
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("value");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
        assert!(!temp.path().join("value.tmp").exists());
    }
}

//! Snapshot backup and restore.
//!
//! A snapshot is a directory `snapshot_<UTC timestamp>` under the store's
//! `backups/` directory holding copies of the data file, the index sidecar
//! and the counter under their original names.
//!
//! ## Invariants
//!
//! - A snapshot is valid only as a complete three-file set
//! - Snapshots are assembled in a hidden `.partial` directory and renamed
//!   into place, so an interrupted backup never looks complete
//! - Restore replaces each live file with temp + rename

use crate::dir::sync_dir;
use crate::error::{CoreError, CoreResult};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Prefix of every snapshot directory name.
pub const SNAPSHOT_PREFIX: &str = "snapshot_";
/// Timestamp format following [`SNAPSHOT_PREFIX`].
pub const SNAPSHOT_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";
const PARTIAL_SUFFIX: &str = ".partial";

/// A complete snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    /// Directory name, e.g. `snapshot_20240101T120000.000000Z`.
    pub name: String,
    /// Full path of the snapshot directory.
    pub path: PathBuf,
    /// Size of the captured data file.
    pub data_bytes: u64,
}

impl SnapshotInfo {
    /// Creation time encoded in the name.
    #[must_use]
    pub fn created(&self) -> Option<NaiveDateTime> {
        let stamp = self.name.strip_prefix(SNAPSHOT_PREFIX)?;
        NaiveDateTime::parse_from_str(stamp, SNAPSHOT_TIME_FORMAT).ok()
    }
}

/// Creates, lists, prunes and restores snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    root: PathBuf,
    artefacts: [PathBuf; 3],
    max_backups: usize,
}

impl SnapshotManager {
    /// Creates a manager storing snapshots of `artefacts` under `root`.
    ///
    /// `artefacts` are the live data file, index sidecar and counter file.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, artefacts: [PathBuf; 3], max_backups: usize) -> Self {
        Self {
            root: root.into(),
            artefacts,
            max_backups,
        }
    }

    /// Directory holding the snapshots.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_names(&self) -> CoreResult<Vec<&std::ffi::OsStr>> {
        self.artefacts
            .iter()
            .map(|path| {
                path.file_name().ok_or_else(|| {
                    CoreError::invalid_config(format!("not a file path: {}", path.display()))
                })
            })
            .collect()
    }

    fn next_name(&self) -> String {
        let base = format!("{SNAPSHOT_PREFIX}{}", Utc::now().format(SNAPSHOT_TIME_FORMAT));
        let mut name = base.clone();
        let mut n = 1;
        while self.root.join(&name).exists() {
            name = format!("{base}-{n}");
            n += 1;
        }
        name
    }

    /// Copies the three artefacts into a new snapshot, then applies retention.
    ///
    /// The caller must hold the store lock.
    pub fn create(&self) -> CoreResult<SnapshotInfo> {
        fs::create_dir_all(&self.root)?;
        let name = self.next_name();
        let partial = self.root.join(format!(".{name}{PARTIAL_SUFFIX}"));
        if partial.exists() {
            fs::remove_dir_all(&partial)?;
        }
        fs::create_dir(&partial)?;

        for (source, file_name) in self.artefacts.iter().zip(self.file_names()?) {
            let target = partial.join(file_name);
            if source.exists() {
                fs::copy(source, &target)?;
            } else {
                File::create(&target)?;
            }
            File::open(&target)?.sync_all()?;
        }
        sync_dir(&partial)?;

        let path = self.root.join(&name);
        fs::rename(&partial, &path)?;
        sync_dir(&self.root)?;

        let info = self.describe(&name, &path)?;
        info!(snapshot = %info.name, data_bytes = info.data_bytes, "snapshot created");
        self.prune()?;
        Ok(info)
    }

    fn describe(&self, name: &str, path: &Path) -> CoreResult<SnapshotInfo> {
        let data_name = self.file_names()?[0];
        Ok(SnapshotInfo {
            name: name.to_string(),
            path: path.to_path_buf(),
            data_bytes: fs::metadata(path.join(data_name))?.len(),
        })
    }

    fn is_complete(&self, path: &Path) -> CoreResult<bool> {
        Ok(self
            .file_names()?
            .iter()
            .all(|name| path.join(name).is_file()))
    }

    /// Complete snapshots, newest first.
    pub fn list(&self) -> CoreResult<Vec<SnapshotInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !name.starts_with(SNAPSHOT_PREFIX) {
                continue;
            }
            let path = entry.path();
            if self.is_complete(&path)? {
                snapshots.push(self.describe(&name, &path)?);
            }
        }
        snapshots.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(snapshots)
    }

    /// Looks up a complete snapshot by name.
    pub fn find(&self, name: &str) -> CoreResult<SnapshotInfo> {
        let not_found = || CoreError::SnapshotNotFound {
            name: name.to_string(),
        };
        if !name.starts_with(SNAPSHOT_PREFIX) || name.contains(['/', '\\']) {
            return Err(not_found());
        }
        let path = self.root.join(name);
        if path.is_dir() && self.is_complete(&path)? {
            self.describe(name, &path)
        } else {
            Err(not_found())
        }
    }

    /// The newest complete snapshot.
    pub fn latest(&self) -> CoreResult<SnapshotInfo> {
        self.list()?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::SnapshotNotFound {
                name: "latest".to_string(),
            })
    }

    /// Deletes complete snapshots beyond the newest `max_backups`, and any
    /// incomplete or partial snapshot directories. Returns how many
    /// directories were removed.
    pub fn prune(&self) -> CoreResult<usize> {
        let mut removed = 0;
        for stale in self.list()?.iter().skip(self.max_backups) {
            fs::remove_dir_all(&stale.path)?;
            info!(snapshot = %stale.name, "snapshot removed by retention");
            removed += 1;
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let partial = name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX);
            let incomplete = name.starts_with(SNAPSHOT_PREFIX)
                && entry.file_type()?.is_dir()
                && !self.is_complete(&entry.path())?;
            if partial || incomplete {
                warn!(snapshot = name, "removing incomplete snapshot");
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }

        if removed > 0 {
            sync_dir(&self.root)?;
        }
        Ok(removed)
    }

    /// Replaces the live artefacts with the copies in snapshot `name`.
    ///
    /// The caller must hold the store lock and reload its state afterwards.
    pub fn restore(&self, name: &str) -> CoreResult<SnapshotInfo> {
        let snapshot = self.find(name)?;
        for (target, file_name) in self.artefacts.iter().zip(self.file_names()?) {
            let mut temp_name = target.as_os_str().to_owned();
            temp_name.push(".restore");
            let temp = PathBuf::from(temp_name);

            fs::copy(snapshot.path.join(file_name), &temp)?;
            File::open(&temp)?.sync_all()?;
            fs::rename(&temp, target)?;
        }
        if let Some(parent) = self.artefacts[0].parent() {
            sync_dir(parent)?;
        }
        info!(snapshot = %snapshot.name, "snapshot restored");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup(max_backups: usize) -> (tempfile::TempDir, SnapshotManager) {
        let temp = tempdir().unwrap();
        let artefacts = [
            temp.path().join("t.db"),
            temp.path().join("t.idx"),
            temp.path().join("t.ctr"),
        ];
        fs::write(&artefacts[0], b"data").unwrap();
        fs::write(&artefacts[1], b"index").unwrap();
        fs::write(&artefacts[2], b"7").unwrap();
        let manager = SnapshotManager::new(temp.path().join("backups"), artefacts, max_backups);
        (temp, manager)
    }

    #[test]
    fn create_copies_three_files() {
        let (_temp, manager) = setup(5);
        let info = manager.create().unwrap();

        assert!(info.name.starts_with(SNAPSHOT_PREFIX));
        assert!(info.created().is_some());
        assert_eq!(info.data_bytes, 4);
        assert_eq!(fs::read(info.path.join("t.idx")).unwrap(), b"index");
        assert_eq!(fs::read(info.path.join("t.ctr")).unwrap(), b"7");
    }

    #[test]
    fn list_is_newest_first_and_retention_applies() {
        let (_temp, manager) = setup(2);
        let names: Vec<_> = (0..4).map(|_| manager.create().unwrap().name).collect();

        let listed: Vec<_> = manager.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(listed, vec![names[3].clone(), names[2].clone()]);
    }

    #[test]
    fn incomplete_snapshots_are_ignored_and_pruned() {
        let (_temp, manager) = setup(5);
        let broken = manager.root().join("snapshot_19990101T000000.000000Z");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("t.db"), b"x").unwrap();
        let partial = manager.root().join(".snapshot_x.partial");
        fs::create_dir_all(&partial).unwrap();

        assert!(manager.list().unwrap().is_empty());
        assert_eq!(manager.prune().unwrap(), 2);
        assert!(!broken.exists());
        assert!(!partial.exists());
    }

    #[test]
    fn restore_replaces_live_files() {
        let (temp, manager) = setup(5);
        let info = manager.create().unwrap();
        fs::write(temp.path().join("t.db"), b"changed").unwrap();
        fs::write(temp.path().join("t.ctr"), b"99").unwrap();

        manager.restore(&info.name).unwrap();
        assert_eq!(fs::read(temp.path().join("t.db")).unwrap(), b"data");
        assert_eq!(fs::read(temp.path().join("t.ctr")).unwrap(), b"7");
    }

    #[test]
    fn unknown_snapshot_is_not_found() {
        let (_temp, manager) = setup(5);
        assert!(matches!(
            manager.find("snapshot_nope"),
            Err(CoreError::SnapshotNotFound { .. })
        ));
        assert!(matches!(
            manager.find("../t.db"),
            Err(CoreError::SnapshotNotFound { .. })
        ));
        assert!(matches!(
            manager.latest(),
            Err(CoreError::SnapshotNotFound { .. })
        ));
    }
}

//! Store configuration.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default directory used when no `data_dir` is configured.
pub const DEFAULT_DATA_DIR: &str = "accidentdb";
/// Default upper bound for a single record payload.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB
/// Default advisory lock timeout.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 10_000;
/// Default number of snapshots retained.
pub const DEFAULT_MAX_BACKUPS: usize = 5;
/// Default field delimiter for bulk import and delimited export.
pub const DEFAULT_DELIMITER: char = ';';
/// Default upper bound for a bulk import source.
pub const DEFAULT_IMPORT_MAX_BYTES: u64 = 100 * 1024 * 1024; // 100 MiB

/// Configuration for opening a store.
///
/// Can be built in code with the setter methods or loaded from a JSON
/// document where every key is optional:
///
/// ```
/// use accidentdb_core::Config;
///
/// let config = Config::from_json_str(r#"{ "data_dir": "/tmp/acc", "max_backups": 2 }"#).unwrap();
/// assert_eq!(config.max_backups, 2);
/// assert_eq!(config.delimiter, ';');
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the data file, index sidecar, counter and lock.
    pub data_dir: PathBuf,

    /// Maximum accepted payload length in bytes.
    pub max_payload_bytes: u64,

    /// How long an operation waits for the advisory lock.
    pub lock_timeout_ms: u64,

    /// Number of snapshots kept by retention.
    pub max_backups: usize,

    /// Field delimiter for bulk import and delimited export.
    pub delimiter: char,

    /// Maximum size of a bulk import source in bytes.
    pub import_max_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            max_backups: DEFAULT_MAX_BACKUPS,
            delimiter: DEFAULT_DELIMITER,
            import_max_bytes: DEFAULT_IMPORT_MAX_BYTES,
        }
    }
}

impl Config {
    /// Creates a configuration with default values rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the maximum payload length.
    #[must_use]
    pub const fn max_payload_bytes(mut self, bytes: u64) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    /// Sets the lock timeout in milliseconds.
    #[must_use]
    pub const fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.lock_timeout_ms = ms;
        self
    }

    /// Sets the number of snapshots kept by retention.
    #[must_use]
    pub const fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    /// Sets the field delimiter.
    #[must_use]
    pub const fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the bulk import size limit.
    #[must_use]
    pub const fn import_max_bytes(mut self, bytes: u64) -> Self {
        self.import_max_bytes = bytes;
        self
    }

    /// Lock timeout as a [`Duration`].
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Payload limit narrowed to the on-disk length field.
    #[must_use]
    pub fn payload_limit(&self) -> u32 {
        u32::try_from(self.max_payload_bytes).unwrap_or(u32::MAX)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(CoreError::invalid_config("data_dir must not be empty"));
        }
        if self.max_payload_bytes == 0 || self.max_payload_bytes > u64::from(u32::MAX) {
            return Err(CoreError::invalid_config(format!(
                "max_payload_bytes must be between 1 and {}",
                u32::MAX
            )));
        }
        if self.lock_timeout_ms == 0 {
            return Err(CoreError::invalid_config("lock_timeout_ms must be positive"));
        }
        if self.max_backups == 0 {
            return Err(CoreError::invalid_config("max_backups must be at least 1"));
        }
        if self.import_max_bytes == 0 {
            return Err(CoreError::invalid_config("import_max_bytes must be positive"));
        }
        if self.delimiter == '"' || self.delimiter == '\n' || self.delimiter == '\r' {
            return Err(CoreError::invalid_config(format!(
                "delimiter {:?} is not allowed",
                self.delimiter
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

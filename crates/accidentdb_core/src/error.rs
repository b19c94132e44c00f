//! Error types for the record store.

use crate::types::RecordId;
use accidentdb_storage::StorageError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a [`CoreError`], used in logs and by callers
/// that only need to branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A record failed schema validation.
    Invalid,
    /// The id is absent from the index.
    NotFound,
    /// The store lock could not be acquired in time.
    Busy,
    /// Filesystem failure.
    Io,
    /// A record header or payload is inconsistent.
    CorruptRecord,
    /// A file cannot be processed at all.
    CorruptFile,
    /// The configuration was rejected.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "invalid",
            Self::NotFound => "not_found",
            Self::Busy => "busy",
            Self::Io => "io",
            Self::CorruptRecord => "corrupt_record",
            Self::CorruptFile => "corrupt_file",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the record store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record failed schema validation.
    #[error("invalid record: {field}: {message}")]
    Invalid {
        /// The offending field (or `header` / `payload` for structural issues).
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// The id is not present in the primary index.
    #[error("record not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: RecordId,
    },

    /// The advisory lock was not acquired before the timeout elapsed.
    #[error("store busy: lock not acquired within {waited_ms} ms")]
    Busy {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored record is structurally or cryptographically inconsistent.
    #[error("corrupt record at offset {offset}: {message}")]
    CorruptRecord {
        /// Byte offset of the record header in the data file.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A file cannot be processed at all.
    #[error("corrupt file: {message}")]
    CorruptFile {
        /// Description of the problem.
        message: String,
    },

    /// Configuration rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        message: String,
    },

    /// A bulk import source exceeds the configured size limit.
    #[error("import source is {size} bytes, limit is {max} bytes")]
    ImportTooLarge {
        /// Size of the source in bytes.
        size: u64,
        /// Configured limit.
        max: u64,
    },

    /// No complete snapshot with that name exists.
    #[error("snapshot not found: {name}")]
    SnapshotNotFound {
        /// The requested snapshot name.
        name: String,
    },
}

impl CoreError {
    /// Creates a validation error for `field`.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a record corruption error at `offset`.
    pub fn corrupt_record(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            offset,
            message: message.into(),
        }
    }

    /// Creates a file corruption error.
    pub fn corrupt_file(message: impl Into<String>) -> Self {
        Self::CorruptFile {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } | Self::ImportTooLarge { .. } => ErrorKind::Invalid,
            Self::NotFound { .. } | Self::SnapshotNotFound { .. } => ErrorKind::NotFound,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Io(_) | Self::Storage(_) => ErrorKind::Io,
            Self::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            Self::CorruptFile { .. } => ErrorKind::CorruptFile,
            Self::InvalidConfig { .. } => ErrorKind::Config,
        }
    }

    /// Returns the data file offset for record corruption errors.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::CorruptRecord { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

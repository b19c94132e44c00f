//! # accidentdb storage
//!
//! Byte-store backends underneath the accidentdb record store.
//!
//! Backends are **opaque byte stores**: they append, read at an offset,
//! overwrite bytes that already exist, and make writes durable. The record
//! format (headers, tombstones, payloads) belongs to `accidentdb_core`.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - persistent storage on top of OS file APIs
//! - [`InMemoryBackend`] - tests and scratch buffers
//!
//! ## Example
//!
//! ```rust
//! use accidentdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"\x01\x02\x03").unwrap();
//! backend.write_at(offset + 1, &[0xFF]).unwrap();
//! assert_eq!(backend.read_at(offset, 3).unwrap(), vec![0x01, 0xFF, 0x03]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

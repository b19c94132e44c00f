//! # accidentdb testkit
//!
//! Test utilities for accidentdb.
//!
//! This crate provides:
//! - Temporary stores and sample records
//! - Property-based generators for records and operation sequences
//! - Crash simulation on the store's files
//! - An invariant checker for the index, data file and counter
//! - A model-tracking harness and stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use accidentdb_testkit::prelude::*;
//!
//! let store = TestStore::new();
//! let id = store.add(&sample_accident(1)).unwrap();
//! check_invariants(&store, id.as_u64()).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod invariants;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::invariants::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use invariants::*;
pub use stress::*;

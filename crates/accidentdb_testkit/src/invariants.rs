//! Structural invariant checks.
//!
//! After any sequence of operations a store must satisfy:
//!
//! 1. every index entry points at a live header carrying the same id
//! 2. the live ids from a scan equal the index keys
//! 3. every indexed record's payload matches its content hash
//! 4. the counter is at least every id ever assigned
//!
//! and a full rebuild must reproduce the index exactly.

use accidentdb_core::record::DataFile;
use accidentdb_core::{PrimaryIndex, RecordId, Store};
use std::collections::BTreeMap;
use std::fmt;

/// A violated invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation(pub String);

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant violated: {}", self.0)
    }
}

impl std::error::Error for InvariantViolation {}

fn violation(message: impl Into<String>) -> InvariantViolation {
    InvariantViolation(message.into())
}

fn load_index(store: &Store) -> Result<PrimaryIndex, InvariantViolation> {
    PrimaryIndex::load(&store.artefacts()[1]).map_err(|e| violation(format!("sidecar: {e}")))
}

/// Checks the four structural invariants. `max_assigned` is the largest id
/// the caller has seen returned by the store.
pub fn check_invariants(store: &Store, max_assigned: u64) -> Result<(), InvariantViolation> {
    let index = load_index(store)?;
    let in_memory = store.ids();
    if index.keys_sorted() != in_memory {
        return Err(violation("sidecar differs from the in-memory index"));
    }

    let data = DataFile::open(&store.artefacts()[0], store.config().payload_limit())
        .map_err(|e| violation(format!("data file: {e}")))?;

    for (id, offset) in index.iter() {
        let header = data
            .read_header(offset)
            .map_err(|e| violation(format!("header of {id} at {offset}: {e}")))?
            .ok_or_else(|| violation(format!("index entry {id} points past the end")))?;
        if header.id != id || !header.live {
            return Err(violation(format!(
                "index entry {id} at {offset} holds id {} live={}",
                header.id, header.live
            )));
        }
        let record = data
            .read_record(offset)
            .map_err(|e| violation(format!("record {id}: {e}")))?
            .ok_or_else(|| violation(format!("record {id} is incomplete")))?;
        if !record.hash_matches() {
            return Err(violation(format!("record {id} fails its content hash")));
        }
    }

    let scanned: Vec<RecordId> = store
        .scan_live()
        .map_err(|e| violation(format!("scan: {e}")))?
        .map(|(id, _)| id)
        .collect();
    if scanned != in_memory {
        return Err(violation(format!(
            "scan yields {} live ids, index holds {}",
            scanned.len(),
            in_memory.len()
        )));
    }

    if store.counter() < max_assigned {
        return Err(violation(format!(
            "counter {} is below assigned id {max_assigned}",
            store.counter()
        )));
    }
    Ok(())
}

/// Rebuilds the index and checks it is unchanged.
pub fn check_rebuild_is_stable(store: &Store) -> Result<(), InvariantViolation> {
    let before: BTreeMap<u64, u64> = load_index(store)?.entries().clone();
    let report = store
        .rebuild()
        .map_err(|e| violation(format!("rebuild: {e}")))?;
    let after = load_index(store)?.entries().clone();
    if before != after || report.index_changed {
        return Err(violation(format!(
            "rebuild changed the index ({} entries before, {} after)",
            before.len(),
            after.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_accident, TestStore};

    #[test]
    fn fresh_and_populated_stores_pass() {
        let store = TestStore::new();
        check_invariants(&store, 0).unwrap();

        let a = store.add(&sample_accident(1)).unwrap();
        let b = store.add(&sample_accident(2)).unwrap();
        store.update(a, &sample_accident(3)).unwrap();
        store.delete(b).unwrap();

        check_invariants(&store, b.as_u64()).unwrap();
        check_rebuild_is_stable(&store).unwrap();
    }

    #[test]
    fn counter_below_assigned_is_reported() {
        let store = TestStore::new();
        store.add(&sample_accident(1)).unwrap();
        let err = check_invariants(&store, 5).unwrap_err();
        assert!(err.0.contains("counter"));
    }
}

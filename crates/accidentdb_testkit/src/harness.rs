//! Model-tracking harness.
//!
//! Applies operations to a real store and to an in-memory model side by
//! side, asserting after each step that both agree.

use crate::fixtures::TestStore;
use crate::generators::StoreOperation;
use crate::invariants::{check_invariants, check_rebuild_is_stable};
use accidentdb_core::{RecordId, TrafficAccident};
use std::collections::BTreeMap;

/// A store paired with the state it is expected to hold.
pub struct ModelHarness {
    /// The store under test.
    pub store: TestStore,
    model: BTreeMap<RecordId, TrafficAccident>,
    assigned: Vec<RecordId>,
    max_assigned: u64,
}

impl ModelHarness {
    /// Creates a harness over a fresh store.
    pub fn new() -> Self {
        Self {
            store: TestStore::new(),
            model: BTreeMap::new(),
            assigned: Vec::new(),
            max_assigned: 0,
        }
    }

    fn target(&self, slot: usize) -> RecordId {
        if self.assigned.is_empty() {
            RecordId::new(self.max_assigned + 1)
        } else {
            self.assigned[slot % self.assigned.len()]
        }
    }

    /// Applies one operation to the store and the model.
    pub fn apply(&mut self, op: &StoreOperation) {
        match op {
            StoreOperation::Add(record) => {
                let id = self.store.add(record).expect("Failed to add record");
                assert_eq!(id.as_u64(), self.max_assigned + 1, "ids must be sequential");
                self.max_assigned = id.as_u64();
                self.assigned.push(id);
                self.model.insert(id, record.clone());
            }
            StoreOperation::Update { slot, record } => {
                let id = self.target(*slot);
                let updated = self.store.update(id, record).expect("Failed to update");
                assert_eq!(updated, self.model.contains_key(&id), "update of {id}");
                if updated {
                    self.model.insert(id, record.clone());
                }
            }
            StoreOperation::Delete { slot } => {
                let id = self.target(*slot);
                let deleted = self.store.delete(id).expect("Failed to delete");
                assert_eq!(deleted, self.model.remove(&id).is_some(), "delete of {id}");
            }
            StoreOperation::Get { slot } => {
                let id = self.target(*slot);
                let actual = self.store.get(id).expect("Failed to get");
                assert_eq!(actual.as_ref(), self.model.get(&id), "get of {id}");
            }
            StoreOperation::Rebuild => {
                check_rebuild_is_stable(&self.store).expect("Rebuild changed the index");
            }
            StoreOperation::Compact => {
                self.store.compact().expect("Failed to compact");
            }
            StoreOperation::Reopen => self.store.reopen(),
        }
    }

    /// Verifies every tracked record and the structural invariants.
    pub fn verify_all(&self) {
        assert_eq!(self.store.count(), self.model.len());
        assert_eq!(
            self.store.ids(),
            self.model.keys().copied().collect::<Vec<_>>()
        );
        for (id, expected) in &self.model {
            let actual = self.store.get(*id).expect("Failed to get record");
            assert_eq!(actual.as_ref(), Some(expected), "record {id} mismatch");
        }
        check_invariants(&self.store, self.max_assigned).expect("Invariant violated");
    }

    /// Returns the count of tracked records.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }

    /// Largest id assigned so far.
    pub fn max_assigned(&self) -> u64 {
        self.max_assigned
    }
}

impl Default for ModelHarness {
    fn default() -> Self {
        Self::new()
    }
}

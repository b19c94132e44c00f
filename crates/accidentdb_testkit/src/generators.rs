//! Property-based test generators using proptest.
//!
//! Provides strategies for valid records and for sequences of store
//! operations.

use accidentdb_core::TrafficAccident;
use proptest::prelude::*;

/// Strategy for short upper-case categorical values.
pub fn category_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Z ,/()-]{0,24}").expect("Invalid regex")
}

/// Strategy for crash dates in two of the accepted formats.
pub fn crash_date_strategy() -> impl Strategy<Value = String> {
    (2015i32..2026, 1u32..=12, 1u32..=28, any::<bool>()).prop_map(|(y, m, d, iso)| {
        if iso {
            format!("{y:04}-{m:02}-{d:02}")
        } else {
            format!("{m:02}/{d:02}/{y:04}")
        }
    })
}

/// Strategy for records that pass validation.
pub fn accident_strategy() -> impl Strategy<Value = TrafficAccident> {
    let text = (
        crash_date_strategy(),
        category_strategy(),
        category_strategy(),
        category_strategy(),
        prop::sample::select(vec!["Y", "N", "UNKNOWN", ""]),
    );
    let counts = (0u32..10, 0u32..5, 0u32..3, 0u32..3, 0u32..3);
    let time = (0u8..24, 1u8..=7, 1u8..=12);

    (text, counts, time).prop_map(
        |(
            (crash_date, crash_type, weather, cause, intersection),
            (num_units, total, fatal, incapacitating, minor),
            (crash_hour, crash_day_of_week, crash_month),
        )| TrafficAccident {
            crash_date,
            crash_type,
            weather_condition: weather,
            prim_contributory_cause: cause,
            intersection_related_i: intersection.to_string(),
            num_units,
            injuries_total: total + fatal + incapacitating + minor,
            injuries_fatal: fatal,
            injuries_incapacitating: incapacitating,
            injuries_non_incapacitating: minor,
            crash_hour,
            crash_day_of_week,
            crash_month,
            ..TrafficAccident::default()
        },
    )
}

/// A store operation for model-based tests.
///
/// `slot` picks among ids assigned so far (modulo their count); when no id
/// has been assigned it targets an id that was never used.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Add a record
    Add(TrafficAccident),
    /// Replace a record
    Update {
        /// Which assigned id
        slot: usize,
        /// Replacement record
        record: TrafficAccident,
    },
    /// Delete a record
    Delete {
        /// Which assigned id
        slot: usize,
    },
    /// Read a record
    Get {
        /// Which assigned id
        slot: usize,
    },
    /// Rebuild the index
    Rebuild,
    /// Compact the data file
    Compact,
    /// Close and reopen the store
    Reopen,
}

/// Strategy for generating store operations.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        4 => accident_strategy().prop_map(StoreOperation::Add),
        2 => (any::<usize>(), accident_strategy())
            .prop_map(|(slot, record)| StoreOperation::Update { slot, record }),
        2 => any::<usize>().prop_map(|slot| StoreOperation::Delete { slot }),
        2 => any::<usize>().prop_map(|slot| StoreOperation::Get { slot }),
        1 => Just(StoreOperation::Rebuild),
        1 => Just(StoreOperation::Compact),
        1 => Just(StoreOperation::Reopen),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests. Every case touches the
    /// file system, so this is the usual choice.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 2000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_accidents_validate(record in accident_strategy()) {
            prop_assert!(record.validate().is_ok());
        }

        #[test]
        fn generated_payloads_decode(record in accident_strategy()) {
            let payload = record.to_payload().unwrap();
            prop_assert_eq!(TrafficAccident::from_payload(&payload, 0).unwrap(), record);
        }

        #[test]
        fn sequence_length_in_range(ops in operation_sequence_strategy(5, 20)) {
            prop_assert!(ops.len() >= 5 && ops.len() < 20);
        }
    }
}

//! Stress helpers.
//!
//! These exercise a store under many operations and under concurrent
//! access from several threads, sharing one handle or spread over several
//! handles on the same directory.

use crate::fixtures::sample_accident;
use accidentdb_core::{RecordId, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
        }
    }
}

/// Adds `operations` records one at a time.
pub fn stress_sequential_adds(store: &Store, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0;
    let mut failed = 0;
    for n in 0..config.operations {
        match store.add(&sample_accident(n)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }
    StressTestResult::new(successful, failed, start.elapsed())
}

/// Interleaves adds, reads, updates and deletes.
pub fn stress_mixed_operations(store: &Store, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0;
    let mut failed = 0;
    let mut ids: Vec<RecordId> = Vec::new();

    for n in 0..config.operations {
        let outcome = match (n % 4, ids.is_empty()) {
            (_, true) | (0, _) => store.add(&sample_accident(n)).map(|id| ids.push(id)),
            (1, _) => store.get(ids[n % ids.len()]).map(drop),
            (2, _) => store
                .update(ids[n % ids.len()], &sample_accident(n))
                .map(drop),
            _ => {
                let id = ids.swap_remove(n % ids.len());
                store.delete(id).map(drop)
            }
        };
        match outcome {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }
    StressTestResult::new(successful, failed, start.elapsed())
}

/// Adds records from several threads at once and returns every id
/// assigned alongside the result.
///
/// Thread `t` writes through `stores[t % stores.len()]`, so passing handles
/// opened separately on one directory races them against each other.
pub fn stress_concurrent_adds(
    stores: &[Arc<Store>],
    config: &StressConfig,
) -> (StressTestResult, Vec<RecordId>) {
    assert!(!stores.is_empty(), "need at least one store handle");
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let assigned = Arc::new(Mutex::new(Vec::with_capacity(config.operations)));
    let ops_per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&stores[t % stores.len()]);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let assigned = Arc::clone(&assigned);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    match store.add(&sample_accident(t * ops_per_thread + i)) {
                        Ok(id) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                            assigned.lock().expect("Poisoned").push(id);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    let ids = std::mem::take(&mut *assigned.lock().expect("Poisoned"));
    (result, ids)
}

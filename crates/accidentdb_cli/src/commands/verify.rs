//! Verify command implementation.

use crate::ReportFormat;
use accidentdb_core::{Store, VerifyReport};

/// Runs the verify command. Fails if any problem is found.
pub fn run(store: &Store, format: ReportFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", store.path().display());
    println!();

    let report = store.verify()?;
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print_result(&report),
    }

    println!();
    if report.is_clean() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed (run `rebuild` to repair the index)");
        Err("Verification failed".into())
    }
}

fn print_result(report: &VerifyReport) {
    println!("  Records scanned: {}", report.records_scanned);
    println!("  Live:            {}", report.live_records);
    println!("  Tombstones:      {}", report.tombstones);
    println!("  Corrupt regions: {}", report.corrupt_regions);
    println!("  Trailing bytes:  {}", report.trailing_bytes);
    println!(
        "  Counter:         {} (max id {}){}",
        report.counter,
        report.max_id,
        if report.counter_ok() { "" } else { " BEHIND" }
    );
    println!(
        "  Sidecar:         {}",
        if report.sidecar_matches { "in sync" } else { "stale" }
    );

    for offset in &report.hash_mismatches {
        println!("  ✗ hash mismatch at offset {offset}");
    }
    for id in &report.bad_index_entries {
        println!("  ✗ index entry for {id} does not point at a live record");
    }
    for id in &report.unindexed_live {
        println!("  ✗ live record {id} missing from index");
    }
}

//! Inspect command implementation.

use crate::ReportFormat;
use accidentdb_core::{Store, StoreStats};

/// Runs the inspect command.
pub fn run(store: &Store, format: ReportFormat) -> Result<(), Box<dyn std::error::Error>> {
    let stats = store.stats()?;
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        ReportFormat::Text => print_text_output(store, &stats),
    }
    Ok(())
}

fn print_text_output(store: &Store, stats: &StoreStats) {
    println!("Store: {}", store.path().display());
    println!();
    println!("Records");
    println!("  Live:          {}", stats.live_records);
    println!("  Tombstones:    {}", stats.tombstones);
    println!("  Index entries: {}", stats.index_entries);
    println!("  Next id:       {}", stats.counter + 1);
    println!();
    println!("Files");
    println!("  Data:          {}", format_bytes(stats.data_bytes));
    println!("  Snapshots:     {}", stats.snapshots);
}

/// Formats a byte count with a binary unit.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

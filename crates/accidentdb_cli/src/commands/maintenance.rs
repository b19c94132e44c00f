//! Rebuild, compact and clear commands.

use super::inspect::format_bytes;
use accidentdb_core::Store;

/// Rebuilds the index from the data file.
pub fn rebuild(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    let report = store.rebuild()?;

    println!("✓ Index rebuilt");
    println!("  Records scanned: {}", report.records_scanned);
    println!("  Live records:    {}", report.live_records);
    println!("  Tombstones:      {}", report.tombstones);
    if report.corrupt_regions > 0 {
        println!("  Corrupt regions skipped: {}", report.corrupt_regions);
    }
    if report.truncated_bytes > 0 {
        println!("  Incomplete tail removed: {} bytes", report.truncated_bytes);
    }
    if report.index_changed {
        println!("  The previous index was out of date");
    }
    Ok(())
}

/// Rewrites the data file without tombstones.
pub fn compact(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    let result = store.compact()?;

    println!("✓ Compaction complete");
    println!("  Records before:     {}", result.input_records);
    println!("  Records after:      {}", result.output_records);
    println!("  Tombstones removed: {}", result.tombstones_removed);
    println!("  Size before:        {}", format_bytes(result.bytes_before));
    println!("  Size after:         {}", format_bytes(result.bytes_after));
    println!("  Space saved:        {}", format_bytes(result.bytes_saved()));
    Ok(())
}

/// Removes every record. Requires explicit confirmation.
pub fn clear(store: &Store, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirmed {
        return Err("Refusing to clear the store without --yes".into());
    }
    let removed = store.count();
    store.clear()?;
    println!("✓ Store cleared ({removed} records removed)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use accidentdb_core::{Config, TrafficAccident};
    use tempfile::tempdir;

    #[test]
    fn clear_needs_confirmation() {
        let temp = tempdir().unwrap();
        let store = Store::open(Config::new(temp.path())).unwrap();
        store.add(&TrafficAccident::new("2023-01-01", "ANGLE")).unwrap();

        assert!(clear(&store, false).is_err());
        assert_eq!(store.count(), 1);

        clear(&store, true).unwrap();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn compact_and_rebuild_run_on_a_store() {
        let temp = tempdir().unwrap();
        let store = Store::open(Config::new(temp.path())).unwrap();
        let id = store.add(&TrafficAccident::new("2023-01-01", "ANGLE")).unwrap();
        store.add(&TrafficAccident::new("2023-01-02", "ANGLE")).unwrap();
        store.delete(id).unwrap();

        compact(&store).unwrap();
        rebuild(&store).unwrap();
        assert_eq!(store.count(), 1);
    }
}

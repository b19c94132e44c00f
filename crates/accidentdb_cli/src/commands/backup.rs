//! Snapshot commands.

use super::inspect::format_bytes;
use accidentdb_core::Store;

/// Takes a snapshot of the store.
pub fn create(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    let info = store.backup()?;

    println!("✓ Backup created successfully");
    println!("  Name: {}", info.name);
    println!("  Path: {}", info.path.display());
    println!("  Data: {}", format_bytes(info.data_bytes));
    Ok(())
}

/// Lists complete snapshots, newest first.
pub fn list(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    let snapshots = store.list_backups()?;
    if snapshots.is_empty() {
        println!("No backups found");
        return Ok(());
    }
    for info in snapshots {
        let created = info
            .created()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        println!("{}  {}  {}", info.name, created, format_bytes(info.data_bytes));
    }
    Ok(())
}

/// Restores a named snapshot, or the newest one when `latest` is set.
pub fn restore(
    store: &Store,
    name: Option<&str>,
    latest: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = match (name, latest) {
        (_, true) => store.restore_latest()?,
        (Some(name), false) => store.restore(name)?,
        (None, false) => return Err("Snapshot name or --latest required".into()),
    };

    println!("✓ Restored {}", info.name);
    println!("  Live records: {}", store.count());
    Ok(())
}

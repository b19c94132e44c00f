//! Single-record commands.

use accidentdb_core::{RecordId, Store, FIELD_NAMES};

/// Prints every field of one record.
pub fn show(store: &Store, id: RecordId) -> Result<(), Box<dyn std::error::Error>> {
    let record = store.fetch(id)?;

    println!("Record {id}");
    for (name, value) in FIELD_NAMES.iter().zip(record.to_cells()) {
        println!("  {name:<30} {value}");
    }
    Ok(())
}

/// Deletes one record.
pub fn delete(store: &Store, id: RecordId) -> Result<(), Box<dyn std::error::Error>> {
    if store.delete(id)? {
        println!("✓ Deleted record {id}");
        Ok(())
    } else {
        Err(format!("No record with id {id}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accidentdb_core::{Config, TrafficAccident};
    use tempfile::tempdir;

    #[test]
    fn show_and_delete() {
        let temp = tempdir().unwrap();
        let store = Store::open(Config::new(temp.path())).unwrap();
        let id = store.add(&TrafficAccident::new("2023-01-01", "ANGLE")).unwrap();

        show(&store, id).unwrap();
        delete(&store, id).unwrap();
        assert!(show(&store, id).is_err());
        assert!(delete(&store, id).is_err());
    }
}

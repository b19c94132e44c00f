//! Import and export commands.

use crate::ExportFormat;
use accidentdb_core::{Importer, Store};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Rows between progress updates.
const PROGRESS_EVERY: usize = 500;

/// Imports a delimited text file.
pub fn import(
    store: &Store,
    file: &Path,
    delimiter: Option<char>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing {:?}", file);

    let mut importer = Importer::new(store);
    if let Some(delimiter) = delimiter {
        importer = importer.delimiter(delimiter);
    }

    let report = importer.import_file(file, |done, total| {
        if done % PROGRESS_EVERY == 0 || done == total {
            eprint!("\r  {done}/{total} rows");
            let _ = std::io::stderr().flush();
        }
    })?;
    eprintln!();

    println!("✓ Import complete");
    println!("  Rows:     {}", report.rows_total);
    println!("  Imported: {}", report.imported);
    println!("  Skipped:  {}", report.skipped);
    for rejected in &report.rejected {
        println!("  ✗ line {}: {}", rejected.line, rejected.reason);
    }
    if report.skipped > report.rejected.len() {
        println!(
            "  ... and {} more",
            report.skipped - report.rejected.len()
        );
    }
    Ok(())
}

/// Exports live records to a file.
pub fn export(
    store: &Store,
    file: &Path,
    format: ExportFormat,
    delimiter: Option<char>,
) -> Result<(), Box<dyn std::error::Error>> {
    let writer = BufWriter::new(File::create(file)?);
    let written = match format {
        ExportFormat::Csv => {
            store.export_csv(writer, delimiter.unwrap_or(store.config().delimiter))?
        }
        ExportFormat::Json => store.export_json(writer)?,
    };

    println!("✓ Exported {written} records to {}", file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use accidentdb_core::{Config, TrafficAccident};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn export_then_import_into_another_store() {
        let temp = tempdir().unwrap();
        let source = Store::open(Config::new(temp.path().join("a"))).unwrap();
        source.add(&TrafficAccident::new("2023-01-01", "ANGLE")).unwrap();
        source.add(&TrafficAccident::new("2023-01-02", "TURNING")).unwrap();

        let file = temp.path().join("out.csv");
        export(&source, &file, ExportFormat::Csv, Some(',')).unwrap();
        assert!(fs::read_to_string(&file).unwrap().starts_with("id,crash_date,"));

        let target = Store::open(Config::new(temp.path().join("b"))).unwrap();
        import(&target, &file, Some(',')).unwrap();
        assert_eq!(target.count(), 2);
    }

    #[test]
    fn json_export_writes_array() {
        let temp = tempdir().unwrap();
        let store = Store::open(Config::new(temp.path().join("db"))).unwrap();
        store.add(&TrafficAccident::new("2023-01-01", "ANGLE")).unwrap();

        let file = temp.path().join("out.json");
        export(&store, &file, ExportFormat::Json, None).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }
}

//! Bulk import of delimited text.
//!
//! The first non-blank line is a header naming the columns; every later
//! non-blank line is one record. Rows that fail to parse or validate are
//! counted and skipped. Valid rows are written in batches through
//! [`Store::add_many`], so the index is flushed once per batch.

use crate::accident::{split_row, RowLayout, TrafficAccident};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::store::Store;
use crate::types::RecordId;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Rows written per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 256;
/// Rejected rows kept in detail in an [`ImportReport`].
pub const MAX_REPORTED_REJECTIONS: usize = 100;

/// A row that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line number in the source.
    pub line: usize,
    /// Why the row was rejected.
    pub reason: String,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Data rows seen (header and blank lines excluded).
    pub rows_total: usize,
    /// Rows stored.
    pub imported: usize,
    /// Rows skipped.
    pub skipped: usize,
    /// Ids assigned, in source order.
    pub ids: Vec<RecordId>,
    /// The first [`MAX_REPORTED_REJECTIONS`] skipped rows.
    pub rejected: Vec<RejectedRow>,
}

impl ImportReport {
    fn reject(&mut self, line: usize, reason: String) {
        warn!(line, reason = %reason, "skipping row");
        self.skipped += 1;
        if self.rejected.len() < MAX_REPORTED_REJECTIONS {
            self.rejected.push(RejectedRow { line, reason });
        }
    }
}

/// Streams delimited rows into a [`Store`].
#[derive(Debug)]
pub struct Importer<'a> {
    store: &'a Store,
    delimiter: char,
    batch_size: usize,
    max_bytes: u64,
}

impl<'a> Importer<'a> {
    /// Creates an importer using the store's configured delimiter and size limit.
    #[must_use]
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            delimiter: store.config().delimiter,
            batch_size: DEFAULT_BATCH_SIZE,
            max_bytes: store.config().import_max_bytes,
        }
    }

    /// Overrides the field delimiter.
    #[must_use]
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the number of rows written per lock acquisition. `1` writes
    /// each row with its own [`Store::add`].
    #[must_use]
    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    /// Imports a file, reporting `(rows_done, rows_total)` after each row.
    ///
    /// # Errors
    ///
    /// [`CoreError::ImportTooLarge`] if the file exceeds the size limit,
    /// [`CoreError::Invalid`] if the header names no known field, or any
    /// store error other than a row's own validation failure.
    pub fn import_file(
        &self,
        path: &Path,
        progress: impl FnMut(usize, usize),
    ) -> CoreResult<ImportReport> {
        let size = fs::metadata(path)?.len();
        if size > self.max_bytes {
            return Err(CoreError::ImportTooLarge {
                size,
                max: self.max_bytes,
            });
        }
        let rows_total = count_data_rows(BufReader::new(File::open(path)?))?;
        info!(path = %path.display(), rows_total, "import started");
        self.import_reader(BufReader::new(File::open(path)?), rows_total, progress)
    }

    /// Imports from any buffered reader. `rows_total` is only used for
    /// progress reporting; pass `0` if unknown.
    pub fn import_reader<R: BufRead>(
        &self,
        mut reader: R,
        rows_total: usize,
        mut progress: impl FnMut(usize, usize),
    ) -> CoreResult<ImportReport> {
        let mut report = ImportReport::default();
        let mut layout: Option<RowLayout> = None;
        let mut batch: Vec<(usize, TrafficAccident)> = Vec::with_capacity(self.batch_size);
        let mut buf = Vec::new();
        let mut line_no = 0;
        let mut rows_done = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                if layout.is_none() {
                    return Err(CoreError::invalid("header", "not valid UTF-8"));
                }
                rows_done += 1;
                report.reject(line_no, "not valid UTF-8".to_string());
                progress(rows_done, rows_total.max(rows_done));
                continue;
            };
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            let cells = split_row(line, self.delimiter);

            if layout.is_none() {
                layout = Some(RowLayout::from_header(&cells)?);
                continue;
            }
            let Some(row_layout) = layout.as_ref() else {
                continue;
            };

            rows_done += 1;
            match row_layout.parse(&cells) {
                Ok(record) => batch.push((line_no, record)),
                Err(e) => report.reject(line_no, e.to_string()),
            }
            if batch.len() >= self.batch_size {
                self.write_batch(&mut batch, &mut report)?;
            }
            progress(rows_done, rows_total.max(rows_done));
        }
        self.write_batch(&mut batch, &mut report)?;

        report.rows_total = rows_done;
        info!(
            rows = report.rows_total,
            imported = report.imported,
            skipped = report.skipped,
            "import finished"
        );
        Ok(report)
    }

    fn write_batch(
        &self,
        batch: &mut Vec<(usize, TrafficAccident)>,
        report: &mut ImportReport,
    ) -> CoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if batch.len() > 1 {
            let records: Vec<_> = batch.iter().map(|(_, record)| record.clone()).collect();
            match self.store.add_many(&records) {
                Ok(ids) => {
                    report.imported += ids.len();
                    report.ids.extend(ids);
                    batch.clear();
                    return Ok(());
                }
                // fall back to single adds to find the offending rows
                Err(e) if e.kind() == ErrorKind::Invalid => {}
                Err(e) => return Err(e),
            }
        }
        for (line, record) in batch.drain(..) {
            match self.store.add(&record) {
                Ok(id) => {
                    report.imported += 1;
                    report.ids.push(id);
                }
                Err(e) if e.kind() == ErrorKind::Invalid => report.reject(line, e.to_string()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Counts non-blank lines after the header.
fn count_data_rows<R: BufRead>(mut reader: R) -> CoreResult<usize> {
    let mut buf = Vec::new();
    let mut lines = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if !buf.iter().all(u8::is_ascii_whitespace) {
            lines += 1;
        }
    }
    Ok(lines.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::io::Cursor;
    use tempfile::tempdir;

    const HEADER: &str = "crash_date;crash_type;num_units;crash_hour;weather_condition";

    fn store(dir: &Path) -> Store {
        Store::open(Config::new(dir)).unwrap()
    }

    #[test]
    fn imports_valid_rows_and_skips_bad_ones() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        let source = format!(
            "{HEADER}\n2023-01-01;ANGLE;2;5;RAIN\n\nbad-date;ANGLE;1;1;X\n01/02/2023;REAR END;1;23;CLEAR\n2023-01-03;X;-1;0;Y\n"
        );

        let mut calls = Vec::new();
        let report = Importer::new(&store)
            .import_reader(Cursor::new(source), 4, |done, total| calls.push((done, total)))
            .unwrap();

        assert_eq!(report.rows_total, 4);
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.ids, vec![RecordId::new(1), RecordId::new(2)]);
        assert_eq!(report.rejected[0].line, 4);
        assert_eq!(calls.last(), Some(&(4, 4)));
        assert_eq!(store.count(), 2);
        assert_eq!(store.get(RecordId::new(2)).unwrap().unwrap().crash_date, "2023-01-02");
    }

    #[test]
    fn batch_size_one_uses_single_adds() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        let source = format!("{HEADER}\n2023-01-01;A;1;1;X\n2023-01-02;B;1;1;X\n");
        let report = Importer::new(&store)
            .batch_size(1)
            .import_reader(Cursor::new(source), 0, |_, _| {})
            .unwrap();
        assert_eq!(report.imported, 2);
    }

    #[test]
    fn import_file_counts_rows_first() {
        let temp = tempdir().unwrap();
        let store = store(&temp.path().join("db"));
        let path = temp.path().join("in.csv");
        let mut text = format!("{HEADER}\n");
        for n in 0..10 {
            text.push_str(&format!("2023-01-01;T{n};1;1;X\n"));
        }
        fs::write(&path, text).unwrap();

        let mut totals = Vec::new();
        let report = Importer::new(&store)
            .batch_size(3)
            .import_file(&path, |_, total| totals.push(total))
            .unwrap();
        assert_eq!(report.imported, 10);
        assert!(totals.iter().all(|&t| t == 10));
    }

    #[test]
    fn oversized_source_is_rejected_before_reading() {
        let temp = tempdir().unwrap();
        let store = Store::open(Config::new(temp.path().join("db")).import_max_bytes(8)).unwrap();
        let path = temp.path().join("in.csv");
        fs::write(&path, format!("{HEADER}\n2023-01-01;A;1;1;X\n")).unwrap();

        let err = Importer::new(&store).import_file(&path, |_, _| {}).unwrap_err();
        assert!(matches!(err, CoreError::ImportTooLarge { max: 8, .. }));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn custom_delimiter() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        let source = "crash_date,crash_type\n2023-01-01,\"A, B\"\n";
        let report = Importer::new(&store)
            .delimiter(',')
            .import_reader(Cursor::new(source), 0, |_, _| {})
            .unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(store.get(RecordId::new(1)).unwrap().unwrap().crash_type, "A, B");
    }

    #[test]
    fn unrecognised_header_aborts() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        let err = Importer::new(&store)
            .import_reader(Cursor::new("a;b\n1;2\n"), 0, |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn count_skips_header_and_blank_lines() {
        let rows = count_data_rows(Cursor::new("h\n\na\n  \nb\n")).unwrap();
        assert_eq!(rows, 2);
    }
}

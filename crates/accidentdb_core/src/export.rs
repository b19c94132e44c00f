//! Export of live records as delimited text or JSON.

use crate::accident::{join_row, TrafficAccident, FIELD_NAMES};
use crate::error::CoreResult;
use crate::store::Store;
use crate::types::RecordId;
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// One exported record: its id followed by every field.
#[derive(Serialize)]
struct ExportRow<'a> {
    id: RecordId,
    #[serde(flatten)]
    record: &'a TrafficAccident,
}

impl Store {
    /// Writes every live record as delimited rows with a header line,
    /// in ascending id order. Returns the number of records written.
    ///
    /// The output can be read back by [`Importer`](crate::Importer); the
    /// leading `id` column is ignored on import.
    pub fn export_csv<W: Write>(&self, mut writer: W, delimiter: char) -> CoreResult<usize> {
        let mut header = Vec::with_capacity(FIELD_NAMES.len() + 1);
        header.push("id".to_string());
        header.extend(FIELD_NAMES.iter().map(|name| (*name).to_string()));
        writeln!(writer, "{}", join_row(&header, delimiter))?;

        let mut written = 0;
        for (id, record) in self.scan_live()? {
            let mut cells = Vec::with_capacity(FIELD_NAMES.len() + 1);
            cells.push(id.to_string());
            cells.extend(record.to_cells());
            writeln!(writer, "{}", join_row(&cells, delimiter))?;
            written += 1;
        }
        writer.flush()?;
        info!(records = written, format = "csv", "export finished");
        Ok(written)
    }

    /// Writes every live record as a JSON array of objects, one per line,
    /// in ascending id order. Returns the number of records written.
    pub fn export_json<W: Write>(&self, mut writer: W) -> CoreResult<usize> {
        let mut written = 0;
        writer.write_all(b"[")?;
        for (id, record) in self.scan_live()? {
            writer.write_all(if written == 0 { b"\n" } else { b",\n" })?;
            serde_json::to_writer(&mut writer, &ExportRow { id, record: &record })
                .map_err(std::io::Error::from)?;
            written += 1;
        }
        writer.write_all(b"\n]\n")?;
        writer.flush()?;
        info!(records = written, format = "json", "export finished");
        Ok(written)
    }
}

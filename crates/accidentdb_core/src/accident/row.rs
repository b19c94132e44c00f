use super::{normalize_crash_date, TrafficAccident, FIELD_NAMES};
use crate::error::{CoreError, CoreResult};

/// Splits one delimited line into cells.
///
/// Double-quoted cells may contain the delimiter; `""` inside quotes is a
/// literal quote. A trailing `\r` is dropped.
#[must_use]
pub fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == delimiter {
            cells.push(std::mem::take(&mut cell));
        } else {
            cell.push(c);
        }
    }
    cells.push(cell);
    cells
}

/// Joins cells into one delimited line, quoting where needed.
#[must_use]
pub fn join_row(cells: &[String], delimiter: char) -> String {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push(delimiter);
        }
        if cell.contains(delimiter) || cell.contains('"') || cell.contains('\n') {
            line.push('"');
            line.push_str(&cell.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(cell);
        }
    }
    line
}

/// Maps the columns of a delimited source onto record fields.
#[derive(Debug, Clone)]
pub struct RowLayout {
    /// Column position of each entry of [`FIELD_NAMES`], if present.
    columns: [Option<usize>; FIELD_NAMES.len()],
}

impl RowLayout {
    /// Builds a layout from a header row.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Unknown columns (including `id`) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Invalid`] if the header names no known field.
    pub fn from_header(header: &[String]) -> CoreResult<Self> {
        let mut columns = [None; FIELD_NAMES.len()];
        for (position, name) in header.iter().enumerate() {
            let name = name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase();
            if let Some(field) = FIELD_NAMES.iter().position(|f| *f == name) {
                columns[field].get_or_insert(position);
            }
        }
        if columns.iter().all(Option::is_none) {
            return Err(CoreError::invalid("header", "no recognised column names"));
        }
        Ok(Self { columns })
    }

    /// Layout matching [`TrafficAccident::to_cells`].
    #[must_use]
    pub fn canonical() -> Self {
        let mut columns = [None; FIELD_NAMES.len()];
        for (i, column) in columns.iter_mut().enumerate() {
            *column = Some(i);
        }
        Self { columns }
    }

    /// Number of fields the source provides.
    #[must_use]
    pub fn mapped_fields(&self) -> usize {
        self.columns.iter().filter(|c| c.is_some()).count()
    }

    /// Parses one row into a validated record.
    ///
    /// Missing or empty cells take the field's default; the crash date is
    /// normalised to `%Y-%m-%d`.
    pub fn parse(&self, cells: &[String]) -> CoreResult<TrafficAccident> {
        let defaults = TrafficAccident::default();
        let cell = |field: usize| -> Option<&str> {
            self.columns[field]
                .and_then(|column| cells.get(column))
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };
        let text = |field: usize, default: &str| -> String {
            cell(field).unwrap_or(default).to_string()
        };
        let count = |field: usize, default: u32| -> CoreResult<u32> {
            cell(field).map_or(Ok(default), |value| parse_count(FIELD_NAMES[field], value))
        };
        let small = |field: usize, default: u8| -> CoreResult<u8> {
            let value = count(field, u32::from(default))?;
            u8::try_from(value).map_err(|_| {
                CoreError::invalid(FIELD_NAMES[field], format!("{value} out of range"))
            })
        };

        let crash_date = match cell(0) {
            Some(raw) => normalize_crash_date(raw).ok_or_else(|| {
                CoreError::invalid("crash_date", format!("unrecognised date {raw:?}"))
            })?,
            None => String::new(),
        };

        let record = TrafficAccident {
            crash_date,
            traffic_control_device: text(1, &defaults.traffic_control_device),
            weather_condition: text(2, &defaults.weather_condition),
            lighting_condition: text(3, &defaults.lighting_condition),
            first_crash_type: text(4, &defaults.first_crash_type),
            trafficway_type: text(5, &defaults.trafficway_type),
            alignment: text(6, &defaults.alignment),
            roadway_surface_cond: text(7, &defaults.roadway_surface_cond),
            road_defect: text(8, &defaults.road_defect),
            // required: an empty cell must fail validation
            crash_type: if self.columns[9].is_some() {
                text(9, "")
            } else {
                defaults.crash_type.clone()
            },
            intersection_related_i: text(10, &defaults.intersection_related_i),
            damage: text(11, &defaults.damage),
            prim_contributory_cause: text(12, &defaults.prim_contributory_cause),
            num_units: count(13, defaults.num_units)?,
            most_severe_injury: text(14, &defaults.most_severe_injury),
            injuries_total: count(15, defaults.injuries_total)?,
            injuries_fatal: count(16, defaults.injuries_fatal)?,
            injuries_incapacitating: count(17, defaults.injuries_incapacitating)?,
            injuries_non_incapacitating: count(18, defaults.injuries_non_incapacitating)?,
            injuries_reported_not_evident: count(19, defaults.injuries_reported_not_evident)?,
            injuries_no_indication: count(20, defaults.injuries_no_indication)?,
            crash_hour: small(21, defaults.crash_hour)?,
            crash_day_of_week: small(22, defaults.crash_day_of_week)?,
            crash_month: small(23, defaults.crash_month)?,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Parses a non-negative count written as `5` or `5.0`.
fn parse_count(field: &str, value: &str) -> CoreResult<u32> {
    if let Ok(n) = value.parse::<u32>() {
        return Ok(n);
    }
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() && n < 0.0 => {
            Err(CoreError::invalid(field, format!("negative count {value:?}")))
        }
        Ok(n) if n.is_finite() && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(n as u32),
        _ => Err(CoreError::invalid(field, format!("not a count: {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(line: &str) -> Vec<String> {
        split_row(line, ';')
    }

    #[test]
    fn split_handles_quotes_and_delimiters() {
        assert_eq!(cells("a;b;;c"), vec!["a", "b", "", "c"]);
        assert_eq!(cells("\"x;y\";\"say \"\"hi\"\"\""), vec!["x;y", "say \"hi\""]);
        assert_eq!(cells("end\r"), vec!["end"]);
    }

    #[test]
    fn join_quotes_only_when_needed() {
        let row = vec!["plain".to_string(), "a;b".to_string(), "q\"".to_string()];
        let line = join_row(&row, ';');
        assert_eq!(line, "plain;\"a;b\";\"q\"\"\"");
        assert_eq!(split_row(&line, ';'), row);
    }

    #[test]
    fn header_matching_is_case_insensitive_and_ignores_unknown() {
        let layout = RowLayout::from_header(&cells("ID; Crash_Type ;CRASH_DATE;notes")).unwrap();
        assert_eq!(layout.mapped_fields(), 2);
        let record = layout.parse(&cells("9;REAR END;07/14/2023;whatever")).unwrap();
        assert_eq!(record.crash_date, "2023-07-14");
        assert_eq!(record.crash_type, "REAR END");
        assert_eq!(record.weather_condition, "UNKNOWN");
    }

    #[test]
    fn header_without_known_fields_is_rejected() {
        assert!(RowLayout::from_header(&cells("a;b;c")).is_err());
    }

    #[test]
    fn canonical_layout_reads_exported_cells() {
        let record = TrafficAccident {
            num_units: 3,
            crash_hour: 8,
            ..TrafficAccident::new("2022-01-02", "ANGLE")
        };
        let parsed = RowLayout::canonical().parse(&record.to_cells()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn numeric_cells_accept_float_notation() {
        let layout = RowLayout::from_header(&cells("crash_date;crash_type;num_units")).unwrap();
        assert_eq!(layout.parse(&cells("2023-01-01;X;5.0")).unwrap().num_units, 5);
        assert_eq!(layout.parse(&cells("2023-01-01;X;")).unwrap().num_units, 0);
    }

    #[test]
    fn malformed_rows_are_invalid() {
        let layout = RowLayout::from_header(&cells(
            "crash_date;crash_type;num_units;crash_hour;intersection_related_i",
        ))
        .unwrap();
        for line in [
            "not-a-date;X;1;1;Y",
            "2023-01-01;;1;1;Y",
            "2023-01-01;X;-3;1;Y",
            "2023-01-01;X;2.5;1;Y",
            "2023-01-01;X;two;1;Y",
            "2023-01-01;X;1;300;Y",
            "2023-01-01;X;1;24;Y",
            "2023-01-01;X;1;1;MAYBE",
        ] {
            let err = layout.parse(&cells(line)).unwrap_err();
            assert!(matches!(err, CoreError::Invalid { .. }), "{line}");
        }
    }

    #[test]
    fn missing_date_column_fails_validation() {
        let layout = RowLayout::from_header(&cells("crash_type")).unwrap();
        assert!(layout.parse(&cells("X")).is_err());
    }

    proptest::proptest! {
        #[test]
        fn join_then_split_preserves_cells(
            row in proptest::collection::vec("[^\r\n]{0,12}", 1..8)
        ) {
            let line = join_row(&row, ';');
            proptest::prop_assert_eq!(split_row(&line, ';'), row);
        }
    }
}

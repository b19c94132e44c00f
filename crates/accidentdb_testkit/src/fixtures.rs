//! Test fixtures and store helpers.
//!
//! Provides temporary stores, deterministic sample records and
//! delimited-text sources for import tests.

use accidentdb_core::accident::join_row;
use accidentdb_core::{Config, Store, TrafficAccident, FIELD_NAMES};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CRASH_TYPES: [&str; 4] = [
    "REAR END",
    "ANGLE",
    "SIDESWIPE SAME DIRECTION",
    "PEDESTRIAN",
];
const WEATHER: [&str; 4] = ["CLEAR", "RAIN", "SNOW", "FOG/SMOKE/HAZE"];
const LIGHTING: [&str; 3] = ["DAYLIGHT", "DARKNESS, LIGHTED ROAD", "DUSK"];

/// A store in a temporary directory, removed on drop.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    config: Config,
    temp_dir: TempDir,
}

impl TestStore {
    /// Creates a store with default settings.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates a store after letting `configure` adjust the defaults.
    /// The data directory is always inside the temporary directory.
    pub fn with_config(configure: impl FnOnce(Config) -> Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(Config::default()).data_dir(temp_dir.path().join("store"));
        let store = Store::open(config.clone()).expect("Failed to open store");
        Self {
            store,
            config,
            temp_dir,
        }
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A directory for scratch files next to the store.
    pub fn scratch_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the data file.
    pub fn data_path(&self) -> PathBuf {
        self.store.artefacts()[0].clone()
    }

    /// Path of the index sidecar.
    pub fn index_path(&self) -> PathBuf {
        self.store.artefacts()[1].clone()
    }

    /// Path of the counter file.
    pub fn counter_path(&self) -> PathBuf {
        self.store.artefacts()[2].clone()
    }

    /// Closes the store, runs `between` on its directory, and opens it again.
    ///
    /// Used to simulate a crash or external tampering while no handle is open.
    pub fn reopen_after(&mut self, between: impl FnOnce(&Path)) {
        let placeholder_dir = self.temp_dir.path().join("placeholder");
        let placeholder = Store::open(self.config.clone().data_dir(placeholder_dir))
            .expect("Failed to open placeholder store");
        drop(std::mem::replace(&mut self.store, placeholder));

        between(&self.config.data_dir);
        self.store = Store::open(self.config.clone()).expect("Failed to reopen store");
    }

    /// Closes and reopens the store unchanged.
    pub fn reopen(&mut self) {
        self.reopen_after(|_| {});
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A valid record whose fields vary with `n`.
pub fn sample_accident(n: usize) -> TrafficAccident {
    let injuries = (n % 3) as u32;
    TrafficAccident {
        crash_date: format!("2023-{:02}-{:02}", n % 12 + 1, n % 28 + 1),
        crash_type: CRASH_TYPES[n % CRASH_TYPES.len()].to_string(),
        weather_condition: WEATHER[n % WEATHER.len()].to_string(),
        lighting_condition: LIGHTING[n % LIGHTING.len()].to_string(),
        intersection_related_i: if n % 2 == 0 { "Y" } else { "N" }.to_string(),
        prim_contributory_cause: format!("CAUSE {n}"),
        num_units: (n % 4) as u32 + 1,
        injuries_total: injuries,
        injuries_non_incapacitating: injuries,
        most_severe_injury: if injuries > 0 {
            "NONINCAPACITATING INJURY"
        } else {
            "NO INDICATION OF INJURY"
        }
        .to_string(),
        crash_hour: (n % 24) as u8,
        crash_day_of_week: (n % 7) as u8 + 1,
        crash_month: (n % 12) as u8 + 1,
        ..TrafficAccident::default()
    }
}

/// `count` sample records starting at `sample_accident(0)`.
pub fn sample_accidents(count: usize) -> Vec<TrafficAccident> {
    (0..count).map(sample_accident).collect()
}

/// Renders records as a delimited source with a header line.
///
/// Each entry of `malformed` is inserted verbatim after the row with the
/// same position, so tests can interleave bad lines with good ones.
pub fn delimited_source(
    records: &[TrafficAccident],
    malformed: &[(usize, &str)],
    delimiter: char,
) -> String {
    let header: Vec<String> = FIELD_NAMES.iter().map(|name| (*name).to_string()).collect();
    let mut text = join_row(&header, delimiter);
    text.push('\n');
    for (position, record) in records.iter().enumerate() {
        text.push_str(&join_row(&record.to_cells(), delimiter));
        text.push('\n');
        for (_, line) in malformed.iter().filter(|(at, _)| *at == position) {
            text.push_str(line);
            text.push('\n');
        }
    }
    text
}

/// Writes a delimited source into `dir` and returns its path.
pub fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write source file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_valid_and_distinct() {
        let records = sample_accidents(50);
        for record in &records {
            record.validate().unwrap();
        }
        assert_ne!(records[0], records[1]);
    }

    #[test]
    fn reopen_keeps_records() {
        let mut store = TestStore::new();
        let id = store.add(&sample_accident(3)).unwrap();
        store.reopen();
        assert_eq!(store.get(id).unwrap(), Some(sample_accident(3)));
    }

    #[test]
    fn source_interleaves_malformed_lines() {
        let text = delimited_source(&sample_accidents(2), &[(0, "garbage")], ';');
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("crash_date;"));
        assert_eq!(lines[2], "garbage");
    }
}

//! Persistent id counter.
//!
//! The counter file holds the last id handed out as ASCII decimal text.
//! A missing or unreadable file is treated as `0` and rewritten; the
//! next rebuild raises the value to the largest id found in the data file.

use crate::dir::write_atomic;
use crate::error::{CoreError, CoreResult};
use crate::types::RecordId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Monotonic source of record ids.
#[derive(Debug)]
pub struct IdCounter {
    path: PathBuf,
    value: u64,
}

impl IdCounter {
    /// Loads the counter from `path`.
    ///
    /// A missing, empty or malformed file yields `0`, which is persisted
    /// immediately.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let value = match fs::read_to_string(path) {
            Ok(text) => match text.trim().parse::<u64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(path = %path.display(), "counter file unreadable, resetting to 0");
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let counter = Self {
            path: path.to_path_buf(),
            value: value.unwrap_or(0),
        };
        if value.is_none() {
            counter.persist()?;
        }
        Ok(counter)
    }

    /// Returns the last id handed out without changing it.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.value
    }

    /// Hands out the next id.
    ///
    /// The new value is durable before the id is returned.
    pub fn allocate(&mut self) -> CoreResult<RecordId> {
        let next = self.advance(1)?;
        Ok(RecordId::new(next))
    }

    /// Hands out `count` consecutive ids with a single durable write.
    pub fn allocate_many(&mut self, count: usize) -> CoreResult<Vec<RecordId>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let first = self.value + 1;
        let last = self.advance(count as u64)?;
        Ok((first..=last).map(RecordId::new).collect())
    }

    /// Raises the counter to at least `max_seen`. Never lowers it.
    pub fn record(&mut self, max_seen: u64) -> CoreResult<()> {
        if max_seen > self.value {
            self.write(max_seen)?;
        }
        Ok(())
    }

    /// Resets the counter to `0`.
    pub fn reset(&mut self) -> CoreResult<()> {
        self.write(0)
    }

    fn advance(&mut self, by: u64) -> CoreResult<u64> {
        let next = self
            .value
            .checked_add(by)
            .ok_or_else(|| CoreError::corrupt_file("id counter exhausted"))?;
        self.write(next)?;
        Ok(next)
    }

    fn write(&mut self, value: u64) -> CoreResult<()> {
        write_atomic(&self.path, value.to_string().as_bytes())?;
        self.value = value;
        Ok(())
    }

    fn persist(&self) -> CoreResult<()> {
        write_atomic(&self.path, self.value.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_starts_at_zero_and_is_created() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("c.ctr");
        let counter = IdCounter::load(&path).unwrap();
        assert_eq!(counter.peek(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");
    }

    #[test]
    fn malformed_file_resets_to_zero() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("c.ctr");
        fs::write(&path, "not a number").unwrap();
        let counter = IdCounter::load(&path).unwrap();
        assert_eq!(counter.peek(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");
    }

    #[test]
    fn allocate_persists_each_value() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("c.ctr");
        let mut counter = IdCounter::load(&path).unwrap();

        assert_eq!(counter.allocate().unwrap(), RecordId::new(1));
        assert_eq!(counter.allocate().unwrap(), RecordId::new(2));
        assert_eq!(fs::read_to_string(&path).unwrap(), "2");

        let reloaded = IdCounter::load(&path).unwrap();
        assert_eq!(reloaded.peek(), 2);
    }

    #[test]
    fn allocate_many_is_consecutive() {
        let temp = tempdir().unwrap();
        let mut counter = IdCounter::load(&temp.path().join("c.ctr")).unwrap();
        counter.allocate().unwrap();

        let ids = counter.allocate_many(3).unwrap();
        assert_eq!(ids, vec![RecordId::new(2), RecordId::new(3), RecordId::new(4)]);
        assert_eq!(counter.peek(), 4);
        assert!(counter.allocate_many(0).unwrap().is_empty());
    }

    #[test]
    fn record_never_lowers() {
        let temp = tempdir().unwrap();
        let mut counter = IdCounter::load(&temp.path().join("c.ctr")).unwrap();
        counter.record(10).unwrap();
        assert_eq!(counter.peek(), 10);
        counter.record(3).unwrap();
        assert_eq!(counter.peek(), 10);
        counter.reset().unwrap();
        assert_eq!(counter.peek(), 0);
    }

    #[test]
    fn whitespace_around_value_is_tolerated() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("c.ctr");
        fs::write(&path, " 41\n").unwrap();
        assert_eq!(IdCounter::load(&path).unwrap().peek(), 41);
    }
}

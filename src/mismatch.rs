//! Mismatched pairs, spooled as they are found and read back on demand.
//!
//! Records are bincode-encoded into a [`tempfile::SpooledTempFile`] that
//! stays in memory up to a byte budget and moves to disk past it. The
//! [`Mismatches`] cursor owns the spool; dropping it releases the storage.

use std::{
    fmt,
    io::{BufReader, BufWriter, Seek, SeekFrom},
};

use serde::{Deserialize, Serialize};
use tempfile::SpooledTempFile;

use crate::{
    data::{Value, display_cell},
    error::{DiffError, Result},
};

pub const DEFAULT_MISMATCH_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// One differing column of a mismatched pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub column: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.column,
            display_cell(self.old.as_ref()),
            display_cell(self.new.as_ref())
        )
    }
}

/// A matched pair whose comparable columns differ, changes in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchRecord {
    pub key: Vec<Value>,
    pub changes: Vec<ColumnChange>,
}

impl MismatchRecord {
    pub fn change(&self, column: &str) -> Option<&ColumnChange> {
        self.changes.iter().find(|c| c.column == column)
    }
}

#[derive(Debug)]
pub struct MismatchSpool {
    writer: BufWriter<SpooledTempFile>,
    records: u64,
}

impl MismatchSpool {
    pub fn new(buffer_bytes: usize) -> Self {
        Self {
            writer: BufWriter::new(SpooledTempFile::new(buffer_bytes)),
            records: 0,
        }
    }

    pub fn push(&mut self, record: &MismatchRecord) -> Result<()> {
        bincode::serde::encode_into_std_write(record, &mut self.writer, bincode::config::standard())
            .map_err(|err| DiffError::io("Writing mismatch spool", std::io::Error::other(err.to_string())))?;
        self.records += 1;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Flushes pending writes and rewinds the spool for reading.
    pub fn into_cursor(self) -> Result<Mismatches> {
        let mut file = self
            .writer
            .into_inner()
            .map_err(|err| DiffError::io("Flushing mismatch spool", err.into_error()))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|err| DiffError::io("Rewinding mismatch spool", err))?;
        Ok(Mismatches {
            reader: Some(BufReader::new(file)),
            remaining: self.records,
        })
    }
}

/// Single-pass cursor over spooled mismatches.
pub struct Mismatches {
    reader: Option<BufReader<SpooledTempFile>>,
    remaining: u64,
}

impl Mismatches {
    pub fn empty() -> Self {
        Self {
            reader: None,
            remaining: 0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl fmt::Debug for Mismatches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mismatches")
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl Iterator for Mismatches {
    type Item = Result<MismatchRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            self.reader = None;
            return None;
        }
        let reader = self.reader.as_mut()?;
        self.remaining -= 1;
        match bincode::serde::decode_from_std_read(reader, bincode::config::standard()) {
            Ok(record) => Some(Ok(record)),
            Err(err) => {
                self.remaining = 0;
                self.reader = None;
                Some(Err(DiffError::io(
                    "Reading mismatch spool",
                    std::io::Error::other(err.to_string()),
                )))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (0, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, old: i64, new: i64) -> MismatchRecord {
        MismatchRecord {
            key: vec![Value::Integer(id)],
            changes: vec![ColumnChange {
                column: "amt".to_string(),
                old: Some(Value::Integer(old)),
                new: Some(Value::Integer(new)),
            }],
        }
    }

    #[test]
    fn spool_replays_records_in_order() {
        let mut spool = MismatchSpool::new(64);
        for id in 0..100 {
            spool.push(&record(id, id, id + 1)).unwrap();
        }
        assert_eq!(spool.len(), 100);
        let records: Vec<MismatchRecord> = spool
            .into_cursor()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 100);
        assert_eq!(records[42], record(42, 42, 43));
    }

    #[test]
    fn cursor_is_single_pass() {
        let mut spool = MismatchSpool::new(1024);
        spool.push(&record(1, 10, 20)).unwrap();
        let mut cursor = spool.into_cursor().unwrap();
        assert_eq!(cursor.remaining(), 1);
        assert!(cursor.next().is_some());
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn nulls_and_floats_survive_the_spool() {
        let mut spool = MismatchSpool::new(16);
        let original = MismatchRecord {
            key: vec![Value::String("k".into())],
            changes: vec![ColumnChange {
                column: "x".into(),
                old: None,
                new: Some(Value::Float(f64::NAN)),
            }],
        };
        spool.push(&original).unwrap();
        let read = spool.into_cursor().unwrap().next().unwrap().unwrap();
        assert_eq!(read, original);
        assert_eq!(read.change("x").unwrap().to_string(), "x:  -> NaN");
    }
}

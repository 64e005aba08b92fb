//! Disk-backed partitions for joins whose resident keys outgrow their budget.
//!
//! Rows are routed by a deterministic hash of their key, so every row
//! sharing a key lands in the same partition pair and each pair can be
//! joined on its own. Each partition side is an anonymous temporary file
//! holding bincode-encoded records in arrival order; the OS reclaims it when
//! the handle drops.
//!
//! Build files hold `(Key, Row)`. Probe files hold `(Key, Option<Row>)`,
//! where `None` marks a new-side key already classified as added before the
//! spill, carried over so later repeats still count as duplicates.

use std::{
    fs::File,
    hash::{DefaultHasher, Hash, Hasher},
    io::{BufReader, BufWriter, Seek, SeekFrom},
    marker::PhantomData,
    path::Path,
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{DiffError, Result},
    key::Key,
    source::Row,
};

pub const DEFAULT_SPILL_PARTITIONS: usize = 16;

pub type BuildEntry = (Key, Row);
pub type ProbeEntry = (Key, Option<Row>);

struct SpillFile {
    writer: BufWriter<File>,
    records: u64,
}

impl SpillFile {
    fn create(dir: Option<&Path>) -> Result<Self> {
        let file = match dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .map_err(|err| DiffError::io("Creating spill file", err))?;
        Ok(Self {
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    fn push<T: Serialize>(&mut self, record: T) -> Result<()> {
        bincode::serde::encode_into_std_write(record, &mut self.writer, bincode::config::standard())
            .map_err(|err| DiffError::io("Writing spill file", std::io::Error::other(err.to_string())))?;
        self.records += 1;
        Ok(())
    }

    fn into_reader<T>(self) -> Result<SpillReader<T>> {
        let mut file = self
            .writer
            .into_inner()
            .map_err(|err| DiffError::io("Flushing spill file", err.into_error()))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|err| DiffError::io("Rewinding spill file", err))?;
        Ok(SpillReader {
            reader: BufReader::new(file),
            remaining: self.records,
            record: PhantomData,
        })
    }
}

/// Reads one partition side back in the order it was written.
pub struct SpillReader<T> {
    reader: BufReader<File>,
    remaining: u64,
    record: PhantomData<T>,
}

impl<T> SpillReader<T> {
    pub fn len(&self) -> u64 {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

impl<T: DeserializeOwned> Iterator for SpillReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let decoded = bincode::serde::decode_from_std_read(&mut self.reader, bincode::config::standard())
            .map_err(|err| DiffError::io("Reading spill file", std::io::Error::other(err.to_string())));
        if decoded.is_err() {
            self.remaining = 0;
        }
        Some(decoded)
    }
}

pub struct SpilledPartition {
    pub build: SpillReader<BuildEntry>,
    pub probe: SpillReader<ProbeEntry>,
}

struct PartitionFiles {
    build: SpillFile,
    probe: SpillFile,
}

pub struct Partitioner {
    partitions: Vec<PartitionFiles>,
}

impl Partitioner {
    pub fn new(count: usize, dir: Option<&Path>) -> Result<Self> {
        let partitions = (0..count.max(1))
            .map(|_| {
                Ok(PartitionFiles {
                    build: SpillFile::create(dir)?,
                    probe: SpillFile::create(dir)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { partitions })
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn partition_of(&self, key: &Key) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }

    pub fn push_build(&mut self, key: &Key, row: &Row) -> Result<()> {
        let idx = self.partition_of(key);
        self.partitions[idx].build.push((key, row))
    }

    pub fn push_probe(&mut self, key: &Key, row: &Row) -> Result<()> {
        let idx = self.partition_of(key);
        self.partitions[idx].probe.push((key, Some(row)))
    }

    /// Records a new-side key that was already counted as added.
    pub fn push_added(&mut self, key: &Key) -> Result<()> {
        let idx = self.partition_of(key);
        self.partitions[idx].probe.push((key, None::<&Row>))
    }

    pub fn finish(self) -> Result<Vec<SpilledPartition>> {
        self.partitions
            .into_iter()
            .map(|files| {
                Ok(SpilledPartition {
                    build: files.build.into_reader()?,
                    probe: files.probe.into_reader()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use tempfile::tempdir;

    fn entry(k: i64, v: &str) -> (Key, Row) {
        (
            Key::new(vec![Value::Integer(k)]),
            Row::new(vec![Some(Value::Integer(k)), Some(Value::String(v.into())), None]),
        )
    }

    #[test]
    fn same_key_lands_in_same_partition_in_order() {
        let dir = tempdir().expect("temp dir");
        let mut partitioner = Partitioner::new(4, Some(dir.path())).unwrap();
        for (k, v) in [(1, "a"), (2, "b"), (1, "c")] {
            let (key, row) = entry(k, v);
            partitioner.push_build(&key, &row).unwrap();
            partitioner.push_probe(&key, &row).unwrap();
        }
        let target = partitioner.partition_of(&Key::new(vec![Value::Integer(1)]));
        let mut partitions = partitioner.finish().unwrap();
        assert_eq!(partitions.len(), 4);
        let total: u64 = partitions.iter().map(|p| p.build.len()).sum();
        assert_eq!(total, 3);

        let rows: Vec<(Key, Row)> = partitions
            .swap_remove(target)
            .build
            .collect::<Result<_>>()
            .unwrap();
        let ones: Vec<&Row> = rows
            .iter()
            .filter(|(key, _)| key.parts()[0] == Value::Integer(1))
            .map(|(_, row)| row)
            .collect();
        assert_eq!(ones, vec![&entry(1, "a").1, &entry(1, "c").1]);
    }

    #[test]
    fn probe_side_keeps_rows_and_added_markers_apart() {
        let mut partitioner = Partitioner::new(1, None).unwrap();
        let (key, row) = entry(7, "x");
        partitioner.push_added(&key).unwrap();
        partitioner.push_probe(&key, &row).unwrap();
        let mut partitions = partitioner.finish().unwrap();
        let probe: Vec<ProbeEntry> = partitions
            .remove(0)
            .probe
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(probe, vec![(key.clone(), None), (key, Some(row))]);
    }

    #[test]
    fn routing_is_deterministic() {
        let first = Partitioner::new(16, None).unwrap();
        let second = Partitioner::new(16, None).unwrap();
        for k in 0..100 {
            let key = Key::new(vec![Value::Integer(k)]);
            assert_eq!(first.partition_of(&key), second.partition_of(&key));
        }
    }
}

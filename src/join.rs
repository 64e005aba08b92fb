//! In-memory hash join of the old (build) side against the new (probe) side.
//!
//! The index keeps first-insertion order. A repeated build key replaces the
//! stored row in place; a repeated probe key replaces the attached partner.
//! Probe keys with no build entry are classified as added on sight and
//! remembered in a key-only set so repeats count as duplicates.
//!
//! Both the index and that set count against the spill budget; see
//! [`HashJoin::resident_keys`] and [`HashJoin::spill`].

use std::collections::HashSet;

use indexmap::{IndexMap, map::Entry};
use log::debug;

use crate::{
    compare::ColumnComparator,
    error::{Result, Side},
    key::Key,
    partition::Partitioner,
    pipeline::CancelToken,
    result::Aggregator,
    source::Row,
};

pub const DEFAULT_COMPARE_BATCH_SIZE: usize = 1024;

struct BuildEntry {
    row: Row,
    partner: Option<Row>,
}

#[derive(Default)]
pub struct HashJoin {
    index: IndexMap<Key, BuildEntry>,
    added_keys: HashSet<Key>,
}

impl HashJoin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct build keys held.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Build keys plus unmatched new-side keys held in memory.
    pub fn resident_keys(&self) -> usize {
        self.index.len() + self.added_keys.len()
    }

    pub fn build(&mut self, key: Key, row: Row, agg: &mut Aggregator) {
        match self.index.entry(key) {
            Entry::Occupied(mut entry) => {
                debug!("Old side repeats key {}; keeping the later row", entry.key().label());
                entry.get_mut().row = row;
                agg.record_duplicate(Side::Old);
            }
            Entry::Vacant(entry) => {
                entry.insert(BuildEntry { row, partner: None });
            }
        }
    }

    pub fn probe(&mut self, key: Key, row: Row, agg: &mut Aggregator) {
        if let Some(entry) = self.index.get_mut(&key) {
            if entry.partner.replace(row).is_some() {
                debug!("New side repeats key {}; keeping the later row", key.label());
                agg.record_duplicate(Side::New);
            }
            return;
        }
        if self.added_keys.contains(&key) {
            debug!("New side repeats unmatched key {}", key.label());
            agg.record_duplicate(Side::New);
        } else {
            self.added_keys.insert(key);
            agg.record_added();
        }
    }

    /// Restores a new-side key that was already counted as added, so that
    /// later rows with the same key count as duplicates.
    pub fn mark_added(&mut self, key: Key) {
        self.added_keys.insert(key);
    }

    /// Classifies every build entry: claimed entries are compared in
    /// batches on the rayon pool, unclaimed ones are removed rows.
    pub fn drain(
        self,
        comparator: &ColumnComparator<'_>,
        batch_size: usize,
        cancel: &CancelToken,
        agg: &mut Aggregator,
    ) -> Result<()> {
        let batch_size = batch_size.max(1);
        let mut batch: Vec<(Key, Row, Row)> = Vec::with_capacity(batch_size.min(self.index.len()));
        for (key, entry) in self.index {
            match entry.partner {
                Some(partner) => {
                    batch.push((key, entry.row, partner));
                    if batch.len() >= batch_size {
                        compare_batch(&mut batch, comparator, cancel, agg)?;
                    }
                }
                None => agg.record_removed(),
            }
        }
        compare_batch(&mut batch, comparator, cancel, agg)
    }

    /// Moves all state to disk partitions: build rows to the build side,
    /// claimed partners and added keys to the probe side. Replaying a
    /// partition in file order restores the same counts.
    pub fn spill(self, partitioner: &mut Partitioner) -> Result<()> {
        for (key, entry) in self.index {
            partitioner.push_build(&key, &entry.row)?;
            if let Some(partner) = &entry.partner {
                partitioner.push_probe(&key, partner)?;
            }
        }
        for key in &self.added_keys {
            partitioner.push_added(key)?;
        }
        Ok(())
    }
}

fn compare_batch(
    batch: &mut Vec<(Key, Row, Row)>,
    comparator: &ColumnComparator<'_>,
    cancel: &CancelToken,
    agg: &mut Aggregator,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    cancel.check()?;
    let diffs = comparator.diff_batch(batch.as_slice(), |(_, old, new)| (old, new));
    for ((key, old, new), differing) in batch.drain(..).zip(diffs) {
        agg.record_matched(&key, &old, &new, &differing)?;
    }
    Ok(())
}

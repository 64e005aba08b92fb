//! Entry points that run a full comparison: reconcile the schemas, build the
//! old side into a hash index, probe it with the new side, then drain.
//!
//! When [`DiffOptions::max_index_rows`] is set and the resident keys (the
//! index plus unmatched new-side keys) grow past it, the run switches to a
//! partitioned join: the in-memory state moves to disk partitions, the rest
//! of both inputs is routed there by key hash, and the partitions are joined
//! one at a time. The switch can happen while reading either side.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::{
    compare::ColumnComparator,
    error::{Result, Side},
    join::{DEFAULT_COMPARE_BATCH_SIZE, HashJoin},
    key::KeyIndexer,
    mismatch::{DEFAULT_MISMATCH_BUFFER_BYTES, MismatchSpool},
    partition::{DEFAULT_SPILL_PARTITIONS, Partitioner},
    pipeline::{CancelToken, for_each_row},
    reconcile::reconcile,
    result::{Aggregator, DiffResult},
    source::{RowSource, SourceOptions, open_source},
};

pub const DEFAULT_SAMPLE_LIMIT: usize = 5;
pub const DEFAULT_PREFETCH_ROWS: usize = 1024;

#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Spool mismatched pairs for [`DiffResult::mismatches`].
    pub materialize_mismatches: bool,
    /// Mismatch samples kept per column.
    pub sample_limit: usize,
    /// Distinct keys held in memory before spilling; `None` never spills.
    pub max_index_rows: Option<usize>,
    pub spill_partitions: usize,
    pub spill_dir: Option<PathBuf>,
    /// Rows decoded ahead on a reader thread; 0 reads inline.
    pub prefetch_rows: usize,
    pub compare_batch_size: usize,
    /// Mismatch bytes held in memory before the spool moves to disk.
    pub mismatch_buffer_bytes: usize,
    pub cancel: CancelToken,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            materialize_mismatches: true,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            max_index_rows: None,
            spill_partitions: DEFAULT_SPILL_PARTITIONS,
            spill_dir: None,
            prefetch_rows: DEFAULT_PREFETCH_ROWS,
            compare_batch_size: DEFAULT_COMPARE_BATCH_SIZE,
            mismatch_buffer_bytes: DEFAULT_MISMATCH_BUFFER_BYTES,
            cancel: CancelToken::default(),
        }
    }
}

/// Opens both files with the adapter their extension selects and compares them.
pub fn compare_files<S: AsRef<str>>(
    path_a: &Path,
    path_b: &Path,
    key_columns: &[S],
    source_options: &SourceOptions,
    options: &DiffOptions,
) -> Result<DiffResult> {
    let source_a = open_source(path_a, source_options)?;
    let source_b = open_source(path_b, source_options)?;
    compare(source_a, source_b, key_columns, options)
}

pub fn compare<A, B, S>(
    mut source_a: A,
    mut source_b: B,
    key_columns: &[S],
    options: &DiffOptions,
) -> Result<DiffResult>
where
    A: RowSource,
    B: RowSource,
    S: AsRef<str>,
{
    let reconciled = reconcile(source_a.schema(), source_b.schema(), key_columns)?;
    info!(
        "Comparing {} with {} on [{}]: {} comparable column(s)",
        source_a.name(),
        source_b.name(),
        reconciled.key_names().join(", "),
        reconciled.comparable.len()
    );
    let cancel = &options.cancel;
    cancel.check()?;

    let indexer_a = KeyIndexer::new(&reconciled, Side::Old);
    let indexer_b = KeyIndexer::new(&reconciled, Side::New);
    let comparator = ColumnComparator::new(&reconciled.comparable);
    let spool = options
        .materialize_mismatches
        .then(|| MismatchSpool::new(options.mismatch_buffer_bytes));
    let mut agg = Aggregator::new(&reconciled.comparable, options.sample_limit, spool);

    let mut join = HashJoin::new();
    let mut spill: Option<Partitioner> = None;
    let mut ordinal = 0u64;
    for_each_row(&mut source_a, options.prefetch_rows, cancel, |row| {
        ordinal += 1;
        agg.record_row(Side::Old);
        let key = match indexer_a.extract(&row) {
            Ok(key) => key,
            Err(null) => {
                debug!("Rejecting old row {}: {}", ordinal, null);
                agg.record_rejected(Side::Old);
                return Ok(());
            }
        };
        if let Some(partitioner) = spill.as_mut() {
            return partitioner.push_build(&key, &row);
        }
        join.build(key, row, &mut agg);
        spill = spill_if_over_budget(&mut join, options, Side::Old, ordinal)?;
        Ok(())
    })?;
    info!("Read {} old row(s) from {}", ordinal, source_a.name());

    let mut ordinal = 0u64;
    for_each_row(&mut source_b, options.prefetch_rows, cancel, |row| {
        ordinal += 1;
        agg.record_row(Side::New);
        let key = match indexer_b.extract(&row) {
            Ok(key) => key,
            Err(null) => {
                debug!("Rejecting new row {}: {}", ordinal, null);
                agg.record_rejected(Side::New);
                return Ok(());
            }
        };
        if let Some(partitioner) = spill.as_mut() {
            return partitioner.push_probe(&key, &row);
        }
        join.probe(key, row, &mut agg);
        spill = spill_if_over_budget(&mut join, options, Side::New, ordinal)?;
        Ok(())
    })?;
    info!("Read {} new row(s) from {}", ordinal, source_b.name());

    let spill_partitions = match spill {
        None => {
            join.drain(&comparator, options.compare_batch_size, cancel, &mut agg)?;
            0
        }
        Some(partitioner) => {
            let partitions = partitioner.finish()?;
            let count = partitions.len();
            for (idx, partition) in partitions.into_iter().enumerate() {
                cancel.check()?;
                debug!(
                    "Joining partition {} ({} old, {} new row(s))",
                    idx,
                    partition.build.len(),
                    partition.probe.len()
                );
                let mut join = HashJoin::new();
                for entry in partition.build {
                    let (key, row) = entry?;
                    join.build(key, row, &mut agg);
                }
                if let Some(limit) = options.max_index_rows.filter(|limit| join.len() > *limit) {
                    warn!(
                        "Partition {} holds {} key(s), above the {} row budget; joining it in memory",
                        idx,
                        join.len(),
                        limit
                    );
                }
                for entry in partition.probe {
                    cancel.check()?;
                    match entry? {
                        (key, Some(row)) => join.probe(key, row, &mut agg),
                        (key, None) => join.mark_added(key),
                    }
                }
                join.drain(&comparator, options.compare_batch_size, cancel, &mut agg)?;
            }
            count
        }
    };

    let result = agg.finish(&reconciled, spill_partitions);
    info!(
        "Comparison complete: {} matched ({} modified), {} added, {} removed",
        result.matched, result.modified_rows, result.added, result.removed
    );
    if result.rejected_row_counts.total() > 0 || result.duplicate_key_counts.total() > 0 {
        warn!(
            "Rejected null-key rows: old {}, new {}; superseded duplicate keys: old {}, new {}",
            result.rejected_row_counts.a,
            result.rejected_row_counts.b,
            result.duplicate_key_counts.a,
            result.duplicate_key_counts.b
        );
    }
    Ok(result)
}

/// Moves the join to disk once its resident keys pass the budget.
fn spill_if_over_budget(
    join: &mut HashJoin,
    options: &DiffOptions,
    side: Side,
    ordinal: u64,
) -> Result<Option<Partitioner>> {
    if !options.max_index_rows.is_some_and(|limit| join.resident_keys() > limit) {
        return Ok(None);
    }
    let mut partitioner = Partitioner::new(options.spill_partitions, options.spill_dir.as_deref())?;
    info!(
        "Holding {} key(s) at {} row {}; spilling to {} partition(s)",
        join.resident_keys(),
        side,
        ordinal,
        partitioner.len()
    );
    std::mem::take(join).spill(&mut partitioner)?;
    Ok(Some(partitioner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, error::DiffError, schema::ColumnType, source::MemorySource};

    fn source(name: &str, rows: &[(i64, &str)]) -> MemorySource {
        rows.iter().fold(
            MemorySource::builder(name, &[("id", ColumnType::Integer), ("v", ColumnType::String)]),
            |source, (id, v)| source.with_row(vec![Some(Value::Integer(*id)), Some(Value::String(v.to_string()))]),
        )
    }

    #[test]
    fn in_memory_and_spilled_runs_agree() {
        let old: Vec<(i64, &str)> = (0..200).map(|k| (k % 150, if k % 7 == 0 { "x" } else { "y" })).collect();
        let new: Vec<(i64, &str)> = (50..260).map(|k| (k, if k % 5 == 0 { "x" } else { "y" })).collect();
        let baseline = compare(source("a", &old), source("b", &new), &["id"], &DiffOptions::default()).unwrap();
        let spilled = compare(
            source("a", &old),
            source("b", &new),
            &["id"],
            &DiffOptions {
                max_index_rows: Some(10),
                spill_partitions: 4,
                prefetch_rows: 0,
                ..DiffOptions::default()
            },
        )
        .unwrap();
        assert_eq!(spilled.spill_partitions, 4);
        assert_eq!(baseline.spill_partitions, 0);
        assert_eq!(
            (baseline.matched, baseline.added, baseline.removed, baseline.modified_rows),
            (spilled.matched, spilled.added, spilled.removed, spilled.modified_rows)
        );
        assert_eq!(baseline.duplicate_key_counts, spilled.duplicate_key_counts);
        assert_eq!(baseline.duplicate_key_counts.a, 50);
    }

    #[test]
    fn unmatched_new_keys_trigger_a_spill() {
        let old: Vec<(i64, &str)> = (0..10).map(|k| (k, "x")).collect();
        let mut new: Vec<(i64, &str)> = (0..10).map(|k| (k, if k == 3 { "y" } else { "x" })).collect();
        new.extend((1000..3000).map(|k| (k, "n")));
        // Repeats of keys classified as added before the switch.
        new.extend((1000..1050).map(|k| (k, "again")));
        let options = DiffOptions {
            max_index_rows: Some(100),
            spill_partitions: 4,
            prefetch_rows: 0,
            ..DiffOptions::default()
        };
        let baseline = compare(source("a", &old), source("b", &new), &["id"], &DiffOptions::default()).unwrap();
        let spilled = compare(source("a", &old), source("b", &new), &["id"], &options).unwrap();

        assert_eq!(spilled.spill_partitions, 4);
        assert_eq!(
            (spilled.matched, spilled.modified_rows, spilled.added, spilled.removed),
            (10, 1, 2000, 0)
        );
        assert_eq!(spilled.duplicate_key_counts.b, 50);
        assert_eq!(baseline.duplicate_key_counts, spilled.duplicate_key_counts);
        assert_eq!(baseline.added, spilled.added);
    }

    #[test]
    fn cancelled_before_start_reads_nothing() {
        let options = DiffOptions::default();
        options.cancel.cancel();
        let old = source("a", &[(1, "x")]);
        let result = compare(old, source("b", &[(1, "x")]), &["id"], &options);
        assert!(matches!(result, Err(DiffError::Cancelled)));
    }

    #[test]
    fn missing_key_fails_before_reading() {
        let result = compare(
            source("a", &[(1, "x")]),
            source("b", &[(1, "x")]),
            &["nope"],
            &DiffOptions::default(),
        );
        assert!(matches!(result, Err(DiffError::MissingKeyColumn { .. })));
    }
}

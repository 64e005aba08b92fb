//! Counters and per-column statistics for one comparison, and the
//! [`DiffResult`] they finish into.

use log::debug;
use serde::Serialize;

use crate::{
    compare::numeric_delta,
    data::display_cell,
    error::{Result, Side},
    key::Key,
    mismatch::{ColumnChange, MismatchRecord, MismatchSpool, Mismatches},
    reconcile::{ComparableColumn, ReconciledSchema, SchemaDrift},
    schema::ColumnType,
    source::Row,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SideCounts {
    pub a: u64,
    pub b: u64,
}

impl SideCounts {
    fn bump(&mut self, side: Side) {
        match side {
            Side::Old => self.a += 1,
            Side::New => self.b += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.a + self.b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Key,
    Compared,
    OnlyInA,
    OnlyInB,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::Key => "key",
            ColumnRole::Compared => "compared",
            ColumnRole::OnlyInA => "only_in_a",
            ColumnRole::OnlyInB => "only_in_b",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MismatchSample {
    pub key: String,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    pub name: String,
    pub role: ColumnRole,
    pub type_a: Option<ColumnType>,
    pub type_b: Option<ColumnType>,
    pub non_match_count: u64,
    pub match_count: u64,
    /// Percent of matched pairs agreeing on this column; 100 when nothing matched.
    pub match_rate: f64,
    pub null_count_a: u64,
    pub null_count_b: u64,
    pub max_abs_diff: Option<f64>,
    pub samples: Vec<MismatchSample>,
}

impl ColumnReport {
    fn new(name: &str, role: ColumnRole, type_a: Option<ColumnType>, type_b: Option<ColumnType>) -> Self {
        Self {
            name: name.to_string(),
            role,
            type_a,
            type_b,
            non_match_count: 0,
            match_count: 0,
            match_rate: 100.0,
            null_count_a: 0,
            null_count_b: 0,
            max_abs_diff: None,
            samples: Vec::new(),
        }
    }
}

/// Outcome of one comparison. Counters are final; the mismatch stream can be
/// taken once through [`DiffResult::mismatches`].
#[derive(Debug, Serialize)]
pub struct DiffResult {
    pub key_columns: Vec<String>,
    pub rows_a: u64,
    pub rows_b: u64,
    pub matched: u64,
    pub added: u64,
    pub removed: u64,
    pub modified_rows: u64,
    pub identical_rows: u64,
    pub modified_columns: Vec<String>,
    pub duplicate_key_counts: SideCounts,
    pub rejected_row_counts: SideCounts,
    pub schema_drift: SchemaDrift,
    pub columns: Vec<ColumnReport>,
    /// Number of disk partitions the join spilled to; 0 when it ran in memory.
    pub spill_partitions: usize,
    #[serde(skip)]
    spool: Option<MismatchSpool>,
}

impl DiffResult {
    /// Hands out the mismatch stream. The spool moves into the returned
    /// cursor, so later calls get an empty one.
    pub fn mismatches(&mut self) -> Result<Mismatches> {
        match self.spool.take() {
            Some(spool) => spool.into_cursor(),
            None => Ok(Mismatches::empty()),
        }
    }

    pub fn has_differences(&self) -> bool {
        self.added > 0 || self.removed > 0 || self.modified_rows > 0
    }

    pub fn column(&self, name: &str) -> Option<&ColumnReport> {
        self.columns.iter().find(|c| c.name == name)
    }
}

struct ColumnStats {
    non_match: u64,
    null_a: u64,
    null_b: u64,
    max_abs_diff: Option<f64>,
    samples: Vec<MismatchSample>,
}

/// Accumulates everything a [`DiffResult`] reports while the join runs.
pub struct Aggregator {
    comparable: Vec<ComparableColumn>,
    stats: Vec<ColumnStats>,
    sample_limit: usize,
    rows: SideCounts,
    matched: u64,
    added: u64,
    removed: u64,
    modified_rows: u64,
    duplicates: SideCounts,
    rejected: SideCounts,
    spool: Option<MismatchSpool>,
}

impl Aggregator {
    pub fn new(comparable: &[ComparableColumn], sample_limit: usize, spool: Option<MismatchSpool>) -> Self {
        let stats = comparable
            .iter()
            .map(|_| ColumnStats {
                non_match: 0,
                null_a: 0,
                null_b: 0,
                max_abs_diff: None,
                samples: Vec::new(),
            })
            .collect();
        Self {
            comparable: comparable.to_vec(),
            stats,
            sample_limit,
            rows: SideCounts::default(),
            matched: 0,
            added: 0,
            removed: 0,
            modified_rows: 0,
            duplicates: SideCounts::default(),
            rejected: SideCounts::default(),
            spool,
        }
    }

    pub fn record_row(&mut self, side: Side) {
        self.rows.bump(side);
    }

    pub fn record_rejected(&mut self, side: Side) {
        self.rejected.bump(side);
    }

    pub fn record_duplicate(&mut self, side: Side) {
        self.duplicates.bump(side);
    }

    pub fn record_added(&mut self) {
        self.added += 1;
    }

    pub fn record_removed(&mut self) {
        self.removed += 1;
    }

    /// Folds in one matched pair given the comparable positions that differ.
    pub fn record_matched(&mut self, key: &Key, old: &Row, new: &Row, diffs: &[usize]) -> Result<()> {
        self.matched += 1;
        for (column, stats) in self.comparable.iter().zip(self.stats.iter_mut()) {
            if old.get(column.index_a).is_none() {
                stats.null_a += 1;
            }
            if new.get(column.index_b).is_none() {
                stats.null_b += 1;
            }
        }
        if diffs.is_empty() {
            return Ok(());
        }
        self.modified_rows += 1;
        let label = key.label();
        let mut changes = Vec::with_capacity(diffs.len());
        for &pos in diffs {
            let column = &self.comparable[pos];
            let stats = &mut self.stats[pos];
            let old_value = old.get(column.index_a);
            let new_value = new.get(column.index_b);
            stats.non_match += 1;
            if column.type_a.is_numeric() && column.type_b.is_numeric() {
                if let Some(delta) = numeric_delta(old_value, new_value) {
                    stats.max_abs_diff = Some(stats.max_abs_diff.map_or(delta, |max| max.max(delta)));
                }
            }
            if stats.samples.len() < self.sample_limit {
                stats.samples.push(MismatchSample {
                    key: label.clone(),
                    old: display_cell(old_value),
                    new: display_cell(new_value),
                });
            }
            if self.spool.is_some() {
                changes.push(ColumnChange {
                    column: column.name.clone(),
                    old: old_value.cloned(),
                    new: new_value.cloned(),
                });
            }
        }
        if let Some(spool) = self.spool.as_mut() {
            debug!("Key {} differs in {} column(s)", label, changes.len());
            spool.push(&MismatchRecord {
                key: key.parts().to_vec(),
                changes,
            })?;
        }
        Ok(())
    }

    pub fn finish(self, reconciled: &ReconciledSchema, spill_partitions: usize) -> DiffResult {
        let mut columns = Vec::with_capacity(reconciled.schema_a.len() + reconciled.drift.only_in_b.len());
        for column in &reconciled.schema_a.columns {
            let type_b = reconciled.schema_b.column(&column.name).map(|c| c.datatype);
            let report = if reconciled.keys.iter().any(|k| k.name == column.name) {
                ColumnReport::new(&column.name, ColumnRole::Key, Some(column.datatype), type_b)
            } else if let Some(pos) = self.comparable.iter().position(|c| c.name == column.name) {
                self.compared_report(pos)
            } else {
                ColumnReport::new(&column.name, ColumnRole::OnlyInA, Some(column.datatype), None)
            };
            columns.push(report);
        }
        for name in &reconciled.drift.only_in_b {
            let type_b = reconciled.schema_b.column(name).map(|c| c.datatype);
            columns.push(ColumnReport::new(name, ColumnRole::OnlyInB, None, type_b));
        }

        let modified_columns = self
            .comparable
            .iter()
            .zip(&self.stats)
            .filter(|(_, stats)| stats.non_match > 0)
            .map(|(column, _)| column.name.clone())
            .collect();

        DiffResult {
            key_columns: reconciled.key_names(),
            rows_a: self.rows.a,
            rows_b: self.rows.b,
            matched: self.matched,
            added: self.added,
            removed: self.removed,
            modified_rows: self.modified_rows,
            identical_rows: self.matched - self.modified_rows,
            modified_columns,
            duplicate_key_counts: self.duplicates,
            rejected_row_counts: self.rejected,
            schema_drift: reconciled.drift.clone(),
            columns,
            spill_partitions,
            spool: self.spool,
        }
    }

    fn compared_report(&self, pos: usize) -> ColumnReport {
        let column = &self.comparable[pos];
        let stats = &self.stats[pos];
        let mut report = ColumnReport::new(
            &column.name,
            ColumnRole::Compared,
            Some(column.type_a),
            Some(column.type_b),
        );
        report.non_match_count = stats.non_match;
        report.match_count = self.matched - stats.non_match;
        if self.matched > 0 {
            report.match_rate = report.match_count as f64 * 100.0 / self.matched as f64;
        }
        report.null_count_a = stats.null_a;
        report.null_count_b = stats.null_b;
        report.max_abs_diff = stats.max_abs_diff;
        report.samples = stats.samples.clone();
        report
    }
}

use rayon::prelude::*;

use crate::{data::Value, reconcile::ComparableColumn, source::Row};

/// Null-aware equality: two nulls are equal, a null never equals a value.
/// Values of the same variant compare exactly; values whose variants differ
/// compare by their canonical text.
pub fn values_equal(old: Option<&Value>, new: Option<&Value>) -> bool {
    match (old, new) {
        (None, None) => true,
        (Some(a), Some(b)) if a.same_variant(b) => a == b,
        (Some(a), Some(b)) => a.as_display() == b.as_display(),
        _ => false,
    }
}

/// Absolute numeric difference, when both cells hold numbers.
pub fn numeric_delta(old: Option<&Value>, new: Option<&Value>) -> Option<f64> {
    let delta = (old?.as_f64()? - new?.as_f64()?).abs();
    (!delta.is_nan()).then_some(delta)
}

pub struct ColumnComparator<'a> {
    columns: &'a [ComparableColumn],
}

impl<'a> ColumnComparator<'a> {
    pub fn new(columns: &'a [ComparableColumn]) -> Self {
        Self { columns }
    }

    /// Positions (into the comparable column list) of the columns that differ.
    pub fn diff(&self, old: &Row, new: &Row) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !values_equal(old.get(column.index_a), new.get(column.index_b)))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Diffs a batch of pairs on the rayon pool; results line up with the input.
    pub fn diff_batch<T, F>(&self, pairs: &[T], rows: F) -> Vec<Vec<usize>>
    where
        T: Sync,
        F: Fn(&T) -> (&Row, &Row) + Sync,
    {
        if self.columns.is_empty() {
            return vec![Vec::new(); pairs.len()];
        }
        pairs
            .par_iter()
            .map(|pair| {
                let (old, new) = rows(pair);
                self.diff(old, new)
            })
            .collect()
    }
}

mod common;

use std::collections::BTreeMap;

use common::amounts;
use koala_diff::engine::{DiffOptions, compare};
use proptest::prelude::*;

type Rows = Vec<(i64, Option<i64>)>;

fn rows_strategy() -> impl Strategy<Value = Rows> {
    prop::collection::vec((0i64..60, prop::option::weighted(0.8, -5i64..5)), 0..120)
}

/// Last row per key wins, as in the engine.
fn last_by_key(rows: &Rows) -> BTreeMap<i64, Option<i64>> {
    rows.iter().copied().collect()
}

proptest! {
    #[test]
    fn counts_follow_a_keyed_model(old in rows_strategy(), new in rows_strategy()) {
        let result = compare(amounts("a", &old), amounts("b", &new), &["id"], &DiffOptions::default())
            .expect("compare");
        let model_a = last_by_key(&old);
        let model_b = last_by_key(&new);
        let matched = model_a.keys().filter(|k| model_b.contains_key(*k)).count() as u64;
        let modified = model_a
            .iter()
            .filter(|&(k, v)| model_b.get(k).is_some_and(|other| other != v))
            .count() as u64;

        prop_assert_eq!(result.matched, matched);
        prop_assert_eq!(result.removed, model_a.len() as u64 - matched);
        prop_assert_eq!(result.added, model_b.len() as u64 - matched);
        prop_assert_eq!(result.modified_rows, modified);
        prop_assert_eq!(result.duplicate_key_counts.a, (old.len() - model_a.len()) as u64);
        prop_assert_eq!(result.duplicate_key_counts.b, (new.len() - model_b.len()) as u64);
    }

    #[test]
    fn self_comparison_is_clean(rows in rows_strategy()) {
        let result = compare(amounts("a", &rows), amounts("b", &rows), &["id"], &DiffOptions::default())
            .expect("compare");
        prop_assert_eq!(result.added, 0);
        prop_assert_eq!(result.removed, 0);
        prop_assert_eq!(result.modified_rows, 0);
        prop_assert_eq!(result.matched, last_by_key(&rows).len() as u64);
    }

    #[test]
    fn spilling_does_not_change_counts(
        old in rows_strategy(),
        new in rows_strategy(),
        budget in 1usize..20,
        partitions in 1usize..6,
    ) {
        let baseline = compare(amounts("a", &old), amounts("b", &new), &["id"], &DiffOptions::default())
            .expect("in-memory");
        let spilled = compare(
            amounts("a", &old),
            amounts("b", &new),
            &["id"],
            &DiffOptions {
                max_index_rows: Some(budget),
                spill_partitions: partitions,
                prefetch_rows: 0,
                ..DiffOptions::default()
            },
        )
        .expect("spilled");
        prop_assert_eq!(
            (baseline.matched, baseline.added, baseline.removed, baseline.modified_rows),
            (spilled.matched, spilled.added, spilled.removed, spilled.modified_rows)
        );
        prop_assert_eq!(baseline.duplicate_key_counts, spilled.duplicate_key_counts);
        prop_assert_eq!(baseline.modified_columns, spilled.modified_columns);
    }
}

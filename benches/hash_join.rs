use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use koala_diff::engine::{DiffOptions, compare_files};
use koala_diff::source::SourceOptions;
use tempfile::TempDir;

/// Writes an orders snapshot; `revision` shifts the key range and rewrites
/// every seventh amount so two revisions overlap with some changes.
fn generate_orders(dir: &Path, name: &str, rows: usize, revision: usize) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).expect("create csv");
    writeln!(file, "id,ordered_at,status,amount").expect("header");
    for i in revision * 1_000..rows + revision * 1_000 {
        let status = match i % 3 {
            0 => "shipped",
            1 => "pending",
            _ => "processing",
        };
        let day = (i % 28) + 1;
        let amount = if revision > 0 && i % 7 == 0 { i * 2 } else { i };
        writeln!(file, "{i},2024-01-{day:02},{status},{amount}.25").expect("row");
    }
    path
}

fn bench_hash_join(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("temp dir");
    let old = generate_orders(temp_dir.path(), "old.csv", 50_000, 0);
    let new = generate_orders(temp_dir.path(), "new.csv", 50_000, 1);
    let source_options = SourceOptions::default();

    let mut group = c.benchmark_group("compare_orders");
    group.sample_size(10);

    group.bench_function("in_memory", |b| {
        b.iter_batched(
            DiffOptions::default,
            |options| {
                compare_files(&old, &new, &["id"], &source_options, &options).expect("in-memory compare");
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("spilled_16_partitions", |b| {
        b.iter_batched(
            || DiffOptions {
                max_index_rows: Some(5_000),
                spill_dir: Some(temp_dir.path().to_path_buf()),
                ..DiffOptions::default()
            },
            |options| {
                compare_files(&old, &new, &["id"], &source_options, &options).expect("spilled compare");
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("counters_only", |b| {
        b.iter_batched(
            || DiffOptions {
                materialize_mismatches: false,
                sample_limit: 0,
                ..DiffOptions::default()
            },
            |options| {
                compare_files(&old, &new, &["id"], &source_options, &options).expect("counting compare");
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_hash_join);
criterion_main!(benches);

//! Rendering of a [`DiffResult`]: a plain-text summary with a per-column
//! table, a JSON document, and long-format export of mismatched cells.

use std::{
    fmt::Write as _,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use itertools::Itertools;
use serde_json::json;

use crate::{
    data::{Value, display_cell},
    io_utils,
    mismatch::MismatchRecord,
    result::{ColumnReport, ColumnRole, DiffResult},
};

pub fn render_summary(result: &DiffResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Key columns: {}", result.key_columns.join(", "));
    let _ = writeln!(out, "Rows read: old {}, new {}", result.rows_a, result.rows_b);
    let _ = writeln!(
        out,
        "Matched: {} ({} identical, {} modified)",
        result.matched, result.identical_rows, result.modified_rows
    );
    let _ = writeln!(out, "Added: {}", result.added);
    let _ = writeln!(out, "Removed: {}", result.removed);
    let _ = writeln!(
        out,
        "Duplicate keys: old {}, new {}",
        result.duplicate_key_counts.a, result.duplicate_key_counts.b
    );
    let _ = writeln!(
        out,
        "Rejected null-key rows: old {}, new {}",
        result.rejected_row_counts.a, result.rejected_row_counts.b
    );
    let modified = if result.modified_columns.is_empty() {
        "(none)".to_string()
    } else {
        result.modified_columns.join(", ")
    };
    let _ = writeln!(out, "Modified columns: {modified}");
    if !result.schema_drift.is_empty() {
        let _ = writeln!(
            out,
            "Schema drift: only in old [{}]; only in new [{}]",
            result.schema_drift.only_in_a.join(", "),
            result.schema_drift.only_in_b.join(", ")
        );
    }
    if result.spill_partitions > 0 {
        let _ = writeln!(out, "Spilled to {} partition(s)", result.spill_partitions);
    }

    out.push('\n');
    let headers = [
        "column",
        "role",
        "type (old)",
        "type (new)",
        "mismatches",
        "match rate",
        "nulls (old)",
        "nulls (new)",
        "max abs diff",
    ]
    .map(String::from);
    let rows = result.columns.iter().map(column_row).collect::<Vec<_>>();
    out.push_str(&render_table(&headers, &rows));

    let samples = result
        .columns
        .iter()
        .filter(|c| !c.samples.is_empty())
        .collect::<Vec<_>>();
    if !samples.is_empty() {
        out.push_str("\nSamples:\n");
        for column in samples {
            for sample in &column.samples {
                let _ = writeln!(
                    out,
                    "  {} [key {}]: {} -> {}",
                    column.name, sample.key, sample.old, sample.new
                );
            }
        }
    }
    out
}

fn column_row(column: &ColumnReport) -> Vec<String> {
    let type_label = |ty: Option<crate::schema::ColumnType>| ty.map(|t| t.to_string()).unwrap_or_default();
    let compared = column.role == ColumnRole::Compared;
    let stat = |value: u64| if compared { value.to_string() } else { String::new() };
    vec![
        column.name.clone(),
        column.role.as_str().to_string(),
        type_label(column.type_a),
        type_label(column.type_b),
        stat(column.non_match_count),
        if compared {
            format!("{:.2}%", column.match_rate)
        } else {
            String::new()
        },
        stat(column.null_count_a),
        stat(column.null_count_b),
        column.max_abs_diff.map(|d| d.to_string()).unwrap_or_default(),
    ]
}

/// Lays rows out in space-padded columns under a dashed header rule.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    let rows = rows
        .iter()
        .map(|row| row.iter().take(widths.len()).map(|cell| flatten(cell)).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let rule = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();

    let mut out = String::new();
    for line in std::iter::once(headers.to_vec()).chain(std::iter::once(rule)).chain(rows) {
        let text = line
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .join("  ");
        let _ = writeln!(out, "{}", text.trim_end());
    }
    out
}

fn flatten(cell: &str) -> String {
    cell.replace(['\n', '\r', '\t'], " ")
}

/// Writes the summary as pretty JSON to `path`, or stdout when absent or `-`.
pub fn write_json_summary(result: &DiffResult, path: Option<&Path>) -> Result<()> {
    let mut writer: Box<dyn Write> = match path {
        Some(p) if !io_utils::is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating summary file {p:?}"))?,
        )),
        _ => Box::new(io::stdout()),
    };
    serde_json::to_writer_pretty(&mut writer, result).context("Serializing diff summary")?;
    writeln!(writer).context("Writing diff summary")?;
    writer.flush().context("Flushing diff summary")
}

/// Drains the mismatch stream into `path`: long-format delimited text with
/// one line per changed cell, or JSON lines when the extension is
/// `.jsonl`/`.ndjson`. Returns the number of mismatched rows written.
pub fn export_mismatches(
    result: &mut DiffResult,
    path: &Path,
    limit: Option<usize>,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<usize> {
    let key_columns = result.key_columns.clone();
    let records = result
        .mismatches()
        .context("Opening mismatch stream")?
        .take(limit.unwrap_or(usize::MAX));
    let jsonl = matches!(
        path.extension().and_then(|ext| ext.to_str()).map(|ext| ext.to_ascii_lowercase()).as_deref(),
        Some("jsonl" | "ndjson")
    );
    if jsonl {
        let file = File::create(path).with_context(|| format!("Creating mismatch file {path:?}"))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0usize;
        for record in records {
            let record = record.context("Reading mismatch stream")?;
            serde_json::to_writer(&mut writer, &record_json(&key_columns, &record))
                .context("Writing mismatch record")?;
            writeln!(writer).context("Writing mismatch record")?;
            written += 1;
        }
        writer.flush().context("Flushing mismatch file")?;
        return Ok(written);
    }

    let delimiter = io_utils::resolve_output_delimiter(Some(path), delimiter, b',');
    let mut writer = io_utils::open_csv_writer(Some(path), delimiter, encoding)?;
    let mut header = key_columns.clone();
    header.extend(["column", "old", "new"].map(String::from));
    writer.write_record(&header).context("Writing mismatch header")?;
    let mut written = 0usize;
    for record in records {
        let record = record.context("Reading mismatch stream")?;
        let key = record.key.iter().map(Value::as_display).collect::<Vec<_>>();
        for change in &record.changes {
            let mut line = key.clone();
            line.push(change.column.clone());
            line.push(display_cell(change.old.as_ref()));
            line.push(display_cell(change.new.as_ref()));
            writer.write_record(&line).context("Writing mismatch row")?;
        }
        written += 1;
    }
    writer.flush().context("Flushing mismatch file")?;
    Ok(written)
}

fn record_json(key_columns: &[String], record: &MismatchRecord) -> serde_json::Value {
    let key = key_columns
        .iter()
        .zip(&record.key)
        .map(|(name, value)| (name.clone(), json!(value.as_display())))
        .collect::<serde_json::Map<_, _>>();
    let changes = record
        .changes
        .iter()
        .map(|change| {
            json!({
                "column": change.column,
                "old": change.old.as_ref().map(Value::as_display),
                "new": change.new.as_ref().map(Value::as_display),
            })
        })
        .collect::<Vec<_>>();
    json!({ "key": key, "changes": changes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{DiffOptions, compare},
        schema::ColumnType,
        source::MemorySource,
    };
    use std::fs;
    use tempfile::tempdir;

    fn sample_result() -> DiffResult {
        let columns = [("id", ColumnType::Integer), ("amt", ColumnType::Integer)];
        let old = MemorySource::builder("old", &columns)
            .with_row(vec![Some(Value::Integer(1)), Some(Value::Integer(10))])
            .with_row(vec![Some(Value::Integer(2)), Some(Value::Integer(5))]);
        let new = MemorySource::builder("new", &columns)
            .with_row(vec![Some(Value::Integer(1)), Some(Value::Integer(20))])
            .with_row(vec![Some(Value::Integer(2)), None]);
        compare(old, new, &["id"], &DiffOptions::default()).expect("compare")
    }

    #[test]
    fn table_pads_columns_and_flattens_newlines() {
        let headers = vec!["a".to_string(), "long header".to_string()];
        let rows = vec![vec!["multi\nline".to_string(), "x".to_string()]];
        let rendered = render_table(&headers, &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "a           long header");
        assert_eq!(lines[1], "----------  -----------");
        assert_eq!(lines[2], "multi line  x");
    }

    #[test]
    fn summary_lists_counts_and_samples() {
        let rendered = render_summary(&sample_result());
        assert!(rendered.contains("Matched: 2 (0 identical, 2 modified)"));
        assert!(rendered.contains("Modified columns: amt"));
        assert!(rendered.contains("amt [key 1]: 10 -> 20"));
        assert!(rendered.contains("0.00%"));
    }

    #[test]
    fn exports_long_format_csv() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("mismatches.csv");
        let mut result = sample_result();
        let written = export_mismatches(&mut result, &path, None, None, encoding_rs::UTF_8).unwrap();
        assert_eq!(written, 2);
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "id,column,old,new\n1,amt,10,20\n2,amt,5,\n");
    }

    #[test]
    fn exports_json_lines_with_limit() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("mismatches.jsonl");
        let mut result = sample_result();
        let written = export_mismatches(&mut result, &path, Some(1), None, encoding_rs::UTF_8).unwrap();
        assert_eq!(written, 1);
        let contents = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(parsed["key"]["id"], "1");
        assert_eq!(parsed["changes"][0]["old"], "10");
        assert_eq!(parsed["changes"][0]["new"], "20");
    }
}

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use koala_diff::{
    data::Value,
    schema::{ColumnMeta, ColumnType, Schema},
    source::{MemorySource, Row},
};
use tempfile::{TempDir, tempdir};

/// Scratch directory that is removed when the test finishes.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn int(value: i64) -> Option<Value> {
    Some(Value::Integer(value))
}

pub fn text(value: &str) -> Option<Value> {
    Some(Value::String(value.to_string()))
}

pub fn schema(columns: &[(&str, ColumnType)]) -> Schema {
    Schema::new(
        columns
            .iter()
            .map(|(name, ty)| ColumnMeta::new(*name, *ty))
            .collect(),
    )
}

/// In-memory source over `rows`, each laid out in `columns` order.
pub fn memory(name: &str, columns: &[(&str, ColumnType)], rows: Vec<Vec<Option<Value>>>) -> MemorySource {
    MemorySource::new(name, schema(columns), rows.into_iter().map(Row::new).collect())
}

/// `id:integer, amt:integer` rows.
pub fn amounts(name: &str, rows: &[(i64, Option<i64>)]) -> MemorySource {
    memory(
        name,
        &[("id", ColumnType::Integer), ("amt", ColumnType::Integer)],
        rows.iter()
            .map(|(id, amt)| vec![int(*id), amt.map(Value::Integer)])
            .collect(),
    )
}

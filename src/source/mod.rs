//! Row sources: one adapter per input encoding behind the [`RowSource`] trait.
//!
//! The engine only needs a source to declare its schema up front and then
//! hand out rows conforming to it, one at a time, failing with
//! [`DiffError::Decode`](crate::error::DiffError::Decode) on malformed input.
//! [`open_source`] picks the adapter from the file extension unless
//! [`SourceOptions::format`] forces one.

mod columnar;
mod delimited;
mod json;
mod memory;

use std::{fmt, path::Path};

use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    error::{DiffError, Result},
    schema::Schema,
};

pub use self::columnar::ParquetSource;
pub use self::delimited::CsvSource;
pub use self::json::{JsonDocumentSource, JsonLinesSource};
pub use self::memory::MemorySource;

pub const DEFAULT_SAMPLE_ROWS: usize = 2000;

/// One decoded record, positionally aligned with its source's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row(Vec<Option<Value>>);

impl Row {
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Row(values)
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx).and_then(Option::as_ref)
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Option<Value>>> for Row {
    fn from(values: Vec<Option<Value>>) -> Self {
        Row(values)
    }
}

/// A one-shot, ordered stream of rows with a schema declared up front.
pub trait RowSource: Send {
    fn schema(&self) -> &Schema;

    /// Short label used in log lines and decode errors.
    fn name(&self) -> &str;

    /// Returns the next row, `None` once the source is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn schema(&self) -> &Schema {
        (**self).schema()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        (**self).next_row()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum SourceFormat {
    Csv,
    Parquet,
    Json,
    Jsonl,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> SourceFormat {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("parquet" | "pq") => SourceFormat::Parquet,
            Some("jsonl" | "ndjson") => SourceFormat::Jsonl,
            Some("json") => SourceFormat::Json,
            _ => SourceFormat::Csv,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceFormat::Csv => "delimited text",
            SourceFormat::Parquet => "parquet",
            SourceFormat::Json => "json",
            SourceFormat::Jsonl => "json lines",
        };
        f.write_str(label)
    }
}

/// Adapter settings. Options that do not apply to a format are ignored.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub format: Option<SourceFormat>,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    /// Text tokens read as null in delimited files, in addition to empty fields.
    pub null_values: Vec<String>,
    /// Rows sampled for type inference; 0 scans the whole delimited or JSON Lines file.
    pub sample_rows: usize,
    /// Explicit schema for delimited text; skips inference.
    pub schema: Option<Schema>,
    /// When false, delimited text columns are all read as strings.
    pub infer_types: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            format: None,
            delimiter: None,
            encoding: UTF_8,
            null_values: Vec::new(),
            sample_rows: DEFAULT_SAMPLE_ROWS,
            schema: None,
            infer_types: true,
        }
    }
}

pub fn open_source(path: &Path, options: &SourceOptions) -> Result<Box<dyn RowSource>> {
    if !path.exists() {
        return Err(DiffError::io(
            format!("Opening input file {path:?}"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        ));
    }
    let format = options.format.unwrap_or_else(|| SourceFormat::from_path(path));
    log::debug!("Opening {:?} as {}", path, format);
    let source: Box<dyn RowSource> = match format {
        SourceFormat::Csv => Box::new(CsvSource::open(path, options)?),
        SourceFormat::Parquet => Box::new(ParquetSource::open(path)?),
        SourceFormat::Json => Box::new(JsonDocumentSource::open(path)?),
        SourceFormat::Jsonl => Box::new(JsonLinesSource::open(path, options.sample_rows)?),
    };
    Ok(source)
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

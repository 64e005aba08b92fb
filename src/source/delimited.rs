use std::{fs::File, io::BufReader, path::Path};

use encoding_rs::Encoding;
use log::debug;

use super::{Row, RowSource, SourceOptions, display_name};
use crate::{
    data::parse_typed_value,
    error::{DiffError, Result},
    io_utils,
    schema::{ColumnMeta, ColumnType, Schema, TypeCandidate},
};

/// Streams rows from delimited text, typed by an explicit or inferred schema.
pub struct CsvSource {
    name: String,
    schema: Schema,
    reader: csv::Reader<BufReader<File>>,
    record: csv::ByteRecord,
    encoding: &'static Encoding,
    null_values: Vec<String>,
    rows_read: u64,
}

impl CsvSource {
    pub fn open(path: &Path, options: &SourceOptions) -> Result<Self> {
        let name = display_name(path);
        let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
        let schema = match &options.schema {
            Some(schema) => {
                if schema.has_headers {
                    let headers = read_headers(path, delimiter, options.encoding, &name)?;
                    schema
                        .validate_headers(&headers)
                        .map_err(|err| DiffError::decode(&name, 0, err.to_string()))?;
                }
                schema.clone()
            }
            None => infer_schema(path, delimiter, options, &name)?,
        };
        debug!(
            "{} declares {} column(s) using delimiter '{}'",
            name,
            schema.len(),
            crate::printable_delimiter(delimiter)
        );
        let reader = io_utils::open_csv_reader_from_path(path, delimiter, schema.has_headers)?;
        Ok(Self {
            name,
            schema,
            reader,
            record: csv::ByteRecord::new(),
            encoding: options.encoding,
            null_values: options.null_values.clone(),
            rows_read: 0,
        })
    }

    fn is_null_token(&self, value: &str) -> bool {
        value.is_empty() || self.null_values.iter().any(|token| token == value)
    }
}

impl RowSource for CsvSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let record_no = self.rows_read + 1;
        let more = self
            .reader
            .read_byte_record(&mut self.record)
            .map_err(|err| DiffError::decode(&self.name, record_no, err.to_string()))?;
        if !more {
            return Ok(None);
        }
        self.rows_read = record_no;
        let decoded = io_utils::decode_record(&self.record, self.encoding)
            .map_err(|message| DiffError::decode(&self.name, record_no, message))?;
        if decoded.len() != self.schema.len() {
            return Err(DiffError::decode(
                &self.name,
                record_no,
                format!(
                    "expected {} field(s) but found {}",
                    self.schema.len(),
                    decoded.len()
                ),
            ));
        }
        let mut values = Vec::with_capacity(decoded.len());
        for (raw, column) in decoded.iter().zip(&self.schema.columns) {
            if self.is_null_token(raw) {
                values.push(None);
                continue;
            }
            let value = parse_typed_value(raw, &column.datatype).map_err(|message| {
                DiffError::decode(
                    &self.name,
                    record_no,
                    format!("column '{}': {message}", column.name),
                )
            })?;
            values.push(value);
        }
        Ok(Some(Row::new(values)))
    }
}

fn read_headers(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    name: &str,
) -> Result<Vec<String>> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = reader
        .byte_headers()
        .map_err(|err| DiffError::decode(name, 0, err.to_string()))?
        .clone();
    io_utils::decode_record(&headers, encoding).map_err(|message| DiffError::decode(name, 0, message))
}

/// Samples up to `options.sample_rows` records (all of them when 0) and
/// narrows each column to the tightest type every sampled value fits.
fn infer_schema(path: &Path, delimiter: u8, options: &SourceOptions, name: &str) -> Result<Schema> {
    let headers = read_headers(path, delimiter, options.encoding, name)?;
    if !options.infer_types {
        return Ok(string_schema(&headers));
    }
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let mut candidates = vec![TypeCandidate::new(); headers.len()];
    let mut record = csv::ByteRecord::new();
    let mut processed = 0usize;
    loop {
        if options.sample_rows > 0 && processed >= options.sample_rows {
            break;
        }
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|err| DiffError::decode(name, processed as u64 + 1, err.to_string()))?;
        if !more {
            break;
        }
        processed += 1;
        for (idx, field) in record.iter().enumerate().take(headers.len()) {
            let Ok(text) = io_utils::decode_bytes(field, options.encoding) else {
                continue;
            };
            if options.null_values.iter().any(|token| *token == text) {
                continue;
            }
            candidates[idx].update(&text);
        }
    }
    debug!("Inferred column types for {} from {} sampled row(s)", name, processed);
    let columns = headers
        .into_iter()
        .zip(candidates)
        .map(|(header, candidate)| ColumnMeta::new(header, candidate.decide()))
        .collect::<Vec<_>>();
    let schema = Schema::new(columns);
    if let Some(duplicate) = schema.first_duplicate_name() {
        debug!("{} repeats header '{}'", name, duplicate);
    }
    Ok(schema)
}

/// Types every column as text.
fn string_schema(headers: &[String]) -> Schema {
    Schema::new(
        headers
            .iter()
            .map(|h| ColumnMeta::new(h.clone(), ColumnType::String))
            .collect(),
    )
}

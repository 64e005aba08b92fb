use std::{
    collections::VecDeque,
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

use indexmap::IndexMap;
use log::debug;
use serde_json::{Map, Value as Json};

use super::{Row, RowSource, display_name};
use crate::{
    data::json_to_value,
    error::{DiffError, Result},
    schema::{ColumnMeta, JsonTypeCandidate, Schema},
};

type JsonObject = Map<String, Json>;

/// Reads a single JSON document holding an array of objects. The document is
/// parsed whole, so its schema covers every key of every record.
pub struct JsonDocumentSource {
    name: String,
    schema: Schema,
    records: std::vec::IntoIter<Json>,
    rows_read: u64,
}

impl JsonDocumentSource {
    pub fn open(path: &Path) -> Result<Self> {
        let name = display_name(path);
        let file = File::open(path)
            .map_err(|err| DiffError::io(format!("Opening input file {path:?}"), err))?;
        let document: Json = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| DiffError::decode(&name, 0, err.to_string()))?;
        let Json::Array(records) = document else {
            return Err(DiffError::decode(
                &name,
                0,
                "expected a top-level array of objects",
            ));
        };
        let mut inference = SchemaInference::default();
        for (idx, record) in records.iter().enumerate() {
            let object = as_object(record, &name, idx as u64 + 1)?;
            inference.observe(object);
        }
        let schema = inference.finish();
        debug!("{} holds {} record(s) across {} column(s)", name, records.len(), schema.len());
        Ok(Self {
            name,
            schema,
            records: records.into_iter(),
            rows_read: 0,
        })
    }
}

impl RowSource for JsonDocumentSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(record) = self.records.next() else {
            return Ok(None);
        };
        self.rows_read += 1;
        let object = as_object(&record, &self.name, self.rows_read)?;
        object_to_row(object, &self.schema, &self.name, self.rows_read).map(Some)
    }
}

/// Streams newline-delimited JSON objects. The schema is inferred from the
/// first `sample_rows` records, which are buffered and replayed; later
/// records may not introduce new keys. With `sample_rows == 0` a separate
/// pass over the whole file infers the schema and rows stream from a fresh
/// reader, so nothing is buffered.
pub struct JsonLinesSource {
    name: String,
    schema: Schema,
    reader: ObjectLines,
    buffered: VecDeque<(u64, JsonObject)>,
}

impl JsonLinesSource {
    pub fn open(path: &Path, sample_rows: usize) -> Result<Self> {
        let name = display_name(path);
        let mut reader = ObjectLines::open(path, &name)?;
        let mut buffered = VecDeque::new();
        let mut inference = SchemaInference::default();
        let mut sampled = 0usize;
        if sample_rows == 0 {
            let mut scan = ObjectLines::open(path, &name)?;
            while let Some((_, object)) = scan.next_object()? {
                inference.observe(&object);
                sampled += 1;
            }
        } else {
            while buffered.len() < sample_rows {
                let Some((line_no, object)) = reader.next_object()? else {
                    break;
                };
                inference.observe(&object);
                buffered.push_back((line_no, object));
            }
            sampled = buffered.len();
        }
        let schema = inference.finish();
        debug!("{} sampled {} record(s) into {} column(s)", name, sampled, schema.len());
        Ok(Self {
            name,
            schema,
            reader,
            buffered,
        })
    }
}

impl RowSource for JsonLinesSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let next = match self.buffered.pop_front() {
            Some(entry) => Some(entry),
            None => self.reader.next_object()?,
        };
        let Some((line_no, object)) = next else {
            return Ok(None);
        };
        object_to_row(&object, &self.schema, &self.name, line_no).map(Some)
    }
}

/// Non-blank lines of a JSON Lines file, each parsed as one object.
struct ObjectLines {
    name: String,
    lines: Lines<BufReader<File>>,
    line_no: u64,
}

impl ObjectLines {
    fn open(path: &Path, name: &str) -> Result<Self> {
        let file = File::open(path)
            .map_err(|err| DiffError::io(format!("Opening input file {path:?}"), err))?;
        Ok(Self {
            name: name.to_string(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    fn next_object(&mut self) -> Result<Option<(u64, JsonObject)>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.map_err(|err| {
                DiffError::io(format!("Reading {} line {}", self.name, self.line_no), err)
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value: Json = serde_json::from_str(trimmed)
                .map_err(|err| DiffError::decode(&self.name, self.line_no, err.to_string()))?;
            return match value {
                Json::Object(object) => Ok(Some((self.line_no, object))),
                other => Err(DiffError::decode(
                    &self.name,
                    self.line_no,
                    format!("expected a JSON object but found {other}"),
                )),
            };
        }
    }
}

#[derive(Default)]
struct SchemaInference {
    columns: IndexMap<String, JsonTypeCandidate>,
}

impl SchemaInference {
    fn observe(&mut self, object: &JsonObject) {
        for (key, value) in object {
            self.columns.entry(key.clone()).or_default().update(value);
        }
    }

    fn finish(self) -> Schema {
        Schema::new(
            self.columns
                .into_iter()
                .map(|(name, candidate)| ColumnMeta::new(name, candidate.decide()))
                .collect(),
        )
    }
}

fn as_object<'a>(value: &'a Json, name: &str, record: u64) -> Result<&'a JsonObject> {
    value.as_object().ok_or_else(|| {
        DiffError::decode(name, record, format!("expected a JSON object but found {value}"))
    })
}

fn object_to_row(object: &JsonObject, schema: &Schema, name: &str, record: u64) -> Result<Row> {
    if let Some(unknown) = object.keys().find(|key| schema.column_index(key).is_none()) {
        return Err(DiffError::decode(
            name,
            record,
            format!("field '{unknown}' is not part of the sampled schema"),
        ));
    }
    let mut values = Vec::with_capacity(schema.len());
    for column in &schema.columns {
        let value = match object.get(&column.name) {
            Some(raw) => json_to_value(raw, &column.datatype).map_err(|message| {
                DiffError::decode(name, record, format!("column '{}': {message}", column.name))
            })?,
            None => None,
        };
        values.push(value);
    }
    Ok(Row::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, schema::ColumnType};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn document_source_unions_keys_in_first_seen_order() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("orders.json");
        fs::write(&path, r#"[{"id": 1, "amt": 10}, {"id": 2, "note": "late"}]"#).unwrap();
        let mut source = JsonDocumentSource::open(&path).expect("open json");
        assert_eq!(source.schema().headers(), vec!["id", "amt", "note"]);
        assert_eq!(source.schema().columns[1].datatype, ColumnType::Integer);
        let first = source.next_row().unwrap().unwrap();
        assert_eq!(first.get(2), None);
        let second = source.next_row().unwrap().unwrap();
        assert_eq!(second.get(1), None);
        assert_eq!(second.get(2), Some(&Value::String("late".to_string())));
        assert!(source.next_row().unwrap().is_none());
    }

    #[test]
    fn document_source_rejects_non_array_documents() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("object.json");
        fs::write(&path, r#"{"id": 1}"#).unwrap();
        assert!(matches!(
            JsonDocumentSource::open(&path),
            Err(DiffError::Decode { .. })
        ));
    }

    #[test]
    fn lines_source_replays_sample_and_rejects_new_keys() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("events.jsonl");
        fs::write(
            &path,
            "{\"id\": 1, \"v\": 1.5}\n\n{\"id\": 2, \"v\": 2}\n{\"id\": 3, \"extra\": true}\n",
        )
        .unwrap();
        let mut source = JsonLinesSource::open(&path, 2).expect("open jsonl");
        assert_eq!(source.schema().columns[1].datatype, ColumnType::Float);
        assert_eq!(
            source.next_row().unwrap().unwrap().get(1),
            Some(&Value::Float(1.5))
        );
        assert_eq!(
            source.next_row().unwrap().unwrap().get(1),
            Some(&Value::Float(2.0))
        );
        match source.next_row() {
            Err(DiffError::Decode { record, message, .. }) => {
                assert_eq!(record, 4);
                assert!(message.contains("extra"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn lines_source_scans_whole_file_when_sample_is_zero() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("notes.jsonl");
        fs::write(&path, "{\"id\": 1}\n{\"id\": 2, \"note\": \"x\"}\n").unwrap();
        let mut source = JsonLinesSource::open(&path, 0).expect("open jsonl");
        assert_eq!(source.schema().headers(), vec!["id", "note"]);
        assert!(source.buffered.is_empty());
        let first = source.next_row().unwrap().unwrap();
        assert_eq!(first.get(0), Some(&Value::Integer(1)));
        assert_eq!(first.get(1), None);
        let second = source.next_row().unwrap().unwrap();
        assert_eq!(second.get(1), Some(&Value::String("x".to_string())));
        assert!(source.next_row().unwrap().is_none());
    }

    #[test]
    fn lines_source_reports_malformed_lines() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.jsonl");
        fs::write(&path, "{\"id\": 1}\n{\"id\": \n").unwrap();
        let mut source = JsonLinesSource::open(&path, 1).expect("open jsonl");
        assert!(source.next_row().unwrap().is_some());
        assert!(matches!(source.next_row(), Err(DiffError::Decode { record: 2, .. })));
    }
}

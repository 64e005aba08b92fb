use std::{fs::File, path::Path};

use chrono::{DateTime, NaiveDate};
use log::debug;
use parquet::{
    basic::{ConvertedType, LogicalType, Type as PhysicalType},
    file::reader::{FileReader, SerializedFileReader},
    record::{Field, reader::RowIter},
    schema::types::Type,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Row, RowSource, display_name};
use crate::{
    data::Value,
    error::{DiffError, Result},
    schema::{ColumnMeta, ColumnType, Schema},
};

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Streams Parquet records row by row through the record API. Only
/// top-level fields become columns; nested groups are read as their text
/// rendering.
pub struct ParquetSource {
    name: String,
    schema: Schema,
    rows: RowIter<'static>,
    rows_read: u64,
}

impl ParquetSource {
    pub fn open(path: &Path) -> Result<Self> {
        let name = display_name(path);
        let file = File::open(path)
            .map_err(|err| DiffError::io(format!("Opening input file {path:?}"), err))?;
        let reader = SerializedFileReader::new(file)
            .map_err(|err| DiffError::decode(&name, 0, err.to_string()))?;
        let metadata = reader.metadata().file_metadata();
        let schema = Schema::new(
            metadata
                .schema_descr()
                .root_schema()
                .get_fields()
                .iter()
                .map(|field| ColumnMeta::new(field.name(), column_type(field)))
                .collect(),
        );
        debug!(
            "{} holds {} row(s) across {} column(s)",
            name,
            metadata.num_rows(),
            schema.len()
        );
        let reader: Box<dyn FileReader> = Box::new(reader);
        let rows = RowIter::from_file_into(reader);
        Ok(Self {
            name,
            schema,
            rows,
            rows_read: 0,
        })
    }
}

impl RowSource for ParquetSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(next) = self.rows.next() else {
            return Ok(None);
        };
        self.rows_read += 1;
        let record = next.map_err(|err| DiffError::decode(&self.name, self.rows_read, err.to_string()))?;
        let mut values = Vec::with_capacity(self.schema.len());
        for ((_, field), column) in record.get_column_iter().zip(&self.schema.columns) {
            let value = field_to_value(field, column.datatype).map_err(|message| {
                DiffError::decode(
                    &self.name,
                    self.rows_read,
                    format!("column '{}': {message}", column.name),
                )
            })?;
            values.push(value);
        }
        if values.len() != self.schema.len() {
            return Err(DiffError::decode(
                &self.name,
                self.rows_read,
                format!("expected {} field(s) but found {}", self.schema.len(), values.len()),
            ));
        }
        Ok(Some(Row::new(values)))
    }
}

fn column_type(field: &Type) -> ColumnType {
    if !field.is_primitive() {
        return ColumnType::String;
    }
    let info = field.get_basic_info();
    let logical = info.logical_type();
    if matches!(logical, Some(LogicalType::Decimal { .. }))
        || info.converted_type() == ConvertedType::DECIMAL
    {
        return ColumnType::Decimal;
    }
    match field.get_physical_type() {
        PhysicalType::BOOLEAN => ColumnType::Boolean,
        PhysicalType::INT32 => match logical {
            Some(LogicalType::Date) => ColumnType::Date,
            Some(LogicalType::Time { .. }) => ColumnType::String,
            _ if info.converted_type() == ConvertedType::DATE => ColumnType::Date,
            _ => ColumnType::Integer,
        },
        PhysicalType::INT64 => match logical {
            Some(LogicalType::Timestamp { .. }) => ColumnType::DateTime,
            Some(LogicalType::Time { .. }) => ColumnType::String,
            _ if matches!(
                info.converted_type(),
                ConvertedType::TIMESTAMP_MILLIS | ConvertedType::TIMESTAMP_MICROS
            ) =>
            {
                ColumnType::DateTime
            }
            _ => ColumnType::Integer,
        },
        PhysicalType::INT96 => ColumnType::DateTime,
        PhysicalType::FLOAT | PhysicalType::DOUBLE => ColumnType::Float,
        PhysicalType::FIXED_LEN_BYTE_ARRAY if matches!(logical, Some(LogicalType::Uuid)) => {
            ColumnType::Guid
        }
        PhysicalType::BYTE_ARRAY | PhysicalType::FIXED_LEN_BYTE_ARRAY => ColumnType::String,
    }
}

fn field_to_value(field: &Field, ty: ColumnType) -> std::result::Result<Option<Value>, String> {
    let value = match field {
        Field::Null => return Ok(None),
        Field::Bool(b) => Value::Boolean(*b),
        Field::Byte(v) => Value::Integer(i64::from(*v)),
        Field::Short(v) => Value::Integer(i64::from(*v)),
        Field::Int(v) => Value::Integer(i64::from(*v)),
        Field::Long(v) => Value::Integer(*v),
        Field::UByte(v) => Value::Integer(i64::from(*v)),
        Field::UShort(v) => Value::Integer(i64::from(*v)),
        Field::UInt(v) => Value::Integer(i64::from(*v)),
        Field::ULong(v) => Value::Integer(
            i64::try_from(*v).map_err(|_| format!("unsigned value {v} exceeds the integer range"))?,
        ),
        Field::Float(v) => Value::Float(f64::from(*v)),
        Field::Double(v) => Value::Float(*v),
        Field::Str(s) => Value::String(s.clone()),
        Field::Date(days) => Value::Date(
            NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
                .ok_or_else(|| format!("date offset {days} is out of range"))?,
        ),
        Field::TimestampMillis(ms) => Value::DateTime(
            DateTime::from_timestamp_millis(*ms)
                .ok_or_else(|| format!("timestamp {ms}ms is out of range"))?
                .naive_utc(),
        ),
        Field::TimestampMicros(us) => Value::DateTime(
            DateTime::from_timestamp_micros(*us)
                .ok_or_else(|| format!("timestamp {us}us is out of range"))?
                .naive_utc(),
        ),
        Field::Decimal(decimal) => Value::Decimal(decimal_value(decimal.data(), decimal.scale())?),
        Field::Bytes(bytes) if ty == ColumnType::Guid => Value::Guid(
            Uuid::from_slice(bytes.data()).map_err(|err| format!("invalid uuid bytes: {err}"))?,
        ),
        Field::Bytes(bytes) => match std::str::from_utf8(bytes.data()) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::String(field.to_string()),
        },
        other => Value::String(other.to_string()),
    };
    Ok(Some(value))
}

/// Parquet decimals are big-endian two's complement unscaled integers.
fn decimal_value(bytes: &[u8], scale: i32) -> std::result::Result<Decimal, String> {
    if bytes.len() > 16 {
        return Err(format!("decimal of {} bytes exceeds 128 bits", bytes.len()));
    }
    let negative = bytes.first().is_some_and(|b| b & 0x80 != 0);
    let mut buf = if negative { [0xFF; 16] } else { [0; 16] };
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    let unscaled = i128::from_be_bytes(buf);
    let scale = u32::try_from(scale).map_err(|_| format!("negative decimal scale {scale}"))?;
    Decimal::try_from_i128_with_scale(unscaled, scale).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::{
        data_type::{ByteArray, ByteArrayType, Int64Type},
        file::{properties::WriterProperties, writer::SerializedFileWriter},
        schema::parser::parse_message_type,
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_fixture(path: &Path) {
        let schema = Arc::new(
            parse_message_type(
                "message orders {
                    REQUIRED INT64 id;
                    OPTIONAL BYTE_ARRAY name (UTF8);
                }",
            )
            .expect("schema"),
        );
        let file = File::create(path).expect("create");
        let mut writer =
            SerializedFileWriter::new(file, schema, Arc::new(WriterProperties::builder().build()))
                .expect("writer");
        let mut row_group = writer.next_row_group().expect("row group");
        let mut ids = row_group.next_column().expect("column").expect("id column");
        ids.typed::<Int64Type>()
            .write_batch(&[1, 2, 3], None, None)
            .expect("ids");
        ids.close().expect("close ids");
        let mut names = row_group.next_column().expect("column").expect("name column");
        names
            .typed::<ByteArrayType>()
            .write_batch(
                &[ByteArray::from("alpha"), ByteArray::from("gamma")],
                Some(&[1, 0, 1]),
                None,
            )
            .expect("names");
        names.close().expect("close names");
        row_group.close().expect("close row group");
        writer.close().expect("close writer");
    }

    #[test]
    fn reads_typed_rows_with_nulls() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("orders.parquet");
        write_fixture(&path);

        let mut source = ParquetSource::open(&path).expect("open parquet");
        let types: Vec<ColumnType> = source.schema().columns.iter().map(|c| c.datatype).collect();
        assert_eq!(types, vec![ColumnType::Integer, ColumnType::String]);

        let first = source.next_row().unwrap().unwrap();
        assert_eq!(first.get(0), Some(&Value::Integer(1)));
        assert_eq!(first.get(1), Some(&Value::String("alpha".to_string())));
        let second = source.next_row().unwrap().unwrap();
        assert_eq!(second.get(1), None);
        let third = source.next_row().unwrap().unwrap();
        assert_eq!(third.get(1), Some(&Value::String("gamma".to_string())));
        assert!(source.next_row().unwrap().is_none());
    }

    #[test]
    fn decimal_bytes_sign_extend() {
        assert_eq!(decimal_value(&[0x04, 0xD2], 2).unwrap().to_string(), "12.34");
        assert_eq!(decimal_value(&[0xFB, 0x2E], 2).unwrap().to_string(), "-12.34");
    }

    #[test]
    fn epoch_offset_maps_day_zero() {
        let value = field_to_value(&Field::Date(0), ColumnType::Date).unwrap();
        assert_eq!(
            value,
            Some(Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()))
        );
    }

    #[test]
    fn corrupt_files_are_decode_errors() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.parquet");
        std::fs::write(&path, b"not parquet").unwrap();
        assert!(matches!(
            ParquetSource::open(&path),
            Err(DiffError::Decode { .. })
        ));
    }
}

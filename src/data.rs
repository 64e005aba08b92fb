use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::ColumnType;

/// A single non-null cell. Nulls are carried as `Option<Value>::None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Guid(Uuid),
}

impl Value {
    /// Canonical string form, also used to line up values whose declared
    /// types differ between the two inputs.
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Decimal(d) => d.normalize().to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Value::Guid(g) => g.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn same_variant(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Floats compare exactly, except that every NaN equals every other NaN and
/// `0.0 == -0.0`. `Hash` is kept consistent with this.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Guid(a), Value::Guid(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => canonical_float_bits(*f).hash(state),
            Value::Decimal(d) => d.normalize().hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Guid(g) => g.hash(state),
        }
    }
}

fn canonical_float_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Renders an optional cell, using an empty string for null.
pub fn display_cell(value: Option<&Value>) -> String {
    value.map(Value::as_display).unwrap_or_default()
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_time(value: &str) -> Option<NaiveTime> {
    const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}

pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Parses a raw text cell as `ty`. Empty input is null. The error string
/// describes the rejected token and is wrapped by the calling source.
pub fn parse_typed_value(value: &str, ty: &ColumnType) -> Result<Option<Value>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::String(value.to_string()),
        ColumnType::Integer => {
            let parsed: i64 = value
                .trim()
                .parse()
                .map_err(|_| format!("Failed to parse '{value}' as integer"))?;
            Value::Integer(parsed)
        }
        ColumnType::Float => {
            let parsed: f64 = value
                .trim()
                .parse()
                .map_err(|_| format!("Failed to parse '{value}' as float"))?;
            Value::Float(parsed)
        }
        ColumnType::Decimal => {
            let trimmed = value.trim();
            let parsed = Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| format!("Failed to parse '{value}' as decimal"))?;
            Value::Decimal(parsed)
        }
        ColumnType::Boolean => {
            let parsed = parse_boolean(value.trim())
                .ok_or_else(|| format!("Failed to parse '{value}' as boolean"))?;
            Value::Boolean(parsed)
        }
        ColumnType::Date => {
            let parsed = parse_naive_date(value.trim())
                .ok_or_else(|| format!("Failed to parse '{value}' as date"))?;
            Value::Date(parsed)
        }
        ColumnType::DateTime => {
            let parsed = parse_naive_datetime(value.trim())
                .ok_or_else(|| format!("Failed to parse '{value}' as datetime"))?;
            Value::DateTime(parsed)
        }
        ColumnType::Time => {
            let parsed = parse_naive_time(value.trim())
                .ok_or_else(|| format!("Failed to parse '{value}' as time"))?;
            Value::Time(parsed)
        }
        ColumnType::Guid => {
            let trimmed = value.trim().trim_matches(|c| matches!(c, '{' | '}'));
            let parsed = Uuid::parse_str(trimmed)
                .map_err(|_| format!("Failed to parse '{value}' as GUID"))?;
            Value::Guid(parsed)
        }
    };
    Ok(Some(parsed))
}

/// Converts a decoded JSON value into a cell of the column's type. Numbers
/// widen into float and decimal columns, scalars stringify into string
/// columns, and nested arrays or objects are kept as their JSON text.
pub fn json_to_value(value: &serde_json::Value, ty: &ColumnType) -> Result<Option<Value>, String> {
    use serde_json::Value as Json;

    let parsed = match (value, ty) {
        (Json::Null, _) => return Ok(None),
        (Json::String(s), ColumnType::String) => Value::String(s.clone()),
        (Json::String(s), other) => return parse_typed_value(s, other),
        (Json::Bool(b), ColumnType::Boolean) => Value::Boolean(*b),
        (Json::Number(n), ColumnType::Integer) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => return Err(format!("Expected integer but found {n}")),
        },
        (Json::Number(n), ColumnType::Float) => match n.as_f64() {
            Some(f) => Value::Float(f),
            None => return Err(format!("Number {n} is out of range for float")),
        },
        (Json::Number(n), ColumnType::Decimal) => return parse_typed_value(&n.to_string(), ty),
        (Json::Number(n), ColumnType::String) => Value::String(n.to_string()),
        (Json::Bool(b), ColumnType::String) => Value::String(b.to_string()),
        (Json::Array(_) | Json::Object(_), ColumnType::String) => Value::String(value.to_string()),
        (other, ty) => return Err(format!("Cannot read {other} as {ty}")),
    };
    Ok(Some(parsed))
}

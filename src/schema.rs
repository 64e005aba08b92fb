//! Column types, the schema model, YAML persistence, and type inference.
//!
//! A [`Schema`] is the ordered list of columns a row source declares before
//! it yields any rows. Delimited text has no native types, so its schema is
//! either loaded from a YAML file (see [`Schema::load`]) or inferred by
//! sampling rows with [`TypeCandidate`]. JSON inputs are inferred from the
//! JSON value kinds with [`JsonTypeCandidate`].
//!
//! ```yaml
//! has_headers: true
//! columns:
//!   - name: id
//!     datatype: integer
//!   - name: amount
//!     datatype: decimal
//! ```

use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::data::{parse_boolean, parse_naive_date, parse_naive_datetime, parse_naive_time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
    Guid,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Time => "time",
            ColumnType::Guid => "guid",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string", "integer", "float", "decimal", "boolean", "date", "datetime", "time", "guid",
        ]
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Float | ColumnType::Decimal
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" | "text" | "utf8" => Ok(ColumnType::String),
            "integer" | "int" | "long" | "bigint" => Ok(ColumnType::Integer),
            "float" | "double" => Ok(ColumnType::Float),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "date" => Ok(ColumnType::Date),
            "datetime" | "date-time" | "timestamp" => Ok(ColumnType::DateTime),
            "time" => Ok(ColumnType::Time),
            "guid" | "uuid" => Ok(ColumnType::Guid),
            other if other == "decimal" || other.starts_with("decimal(") => {
                Ok(ColumnType::Decimal)
            }
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub datatype: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, datatype: ColumnType) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<ColumnMeta>,
    #[serde(default = "Schema::default_has_headers")]
    pub has_headers: bool,
}

impl Schema {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Schema {
            columns,
            has_headers: true,
        }
    }

    pub fn from_headers(headers: &[String]) -> Self {
        Schema::new(
            headers
                .iter()
                .map(|name| ColumnMeta::new(name.clone(), ColumnType::String))
                .collect(),
        )
    }

    pub const fn default_has_headers() -> bool {
        true
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Returns the first column name that appears more than once.
    pub fn first_duplicate_name(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.columns.len());
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .find(|name| !seen.insert(*name))
    }

    pub fn validate_headers(&self, headers: &[String]) -> Result<()> {
        if headers.len() != self.columns.len() {
            return Err(anyhow!(
                "Header length mismatch: schema expects {} column(s) but file contains {}",
                self.columns.len(),
                headers.len()
            ));
        }
        for (idx, column) in self.columns.iter().enumerate() {
            let name = headers.get(idx).map(|s| s.as_str()).unwrap_or_default();
            if column.name != name {
                return Err(anyhow!(
                    "Header mismatch at position {}: expected '{}' but found '{}'",
                    idx + 1,
                    column.name,
                    name
                ));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: Schema = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        if let Some(name) = schema.first_duplicate_name() {
            return Err(anyhow!("Schema file {path:?} lists column '{name}' more than once"));
        }
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }
}

/// Tracks which types every sampled text value of one column still fits.
#[derive(Debug, Clone)]
pub struct TypeCandidate {
    non_empty: usize,
    possible_boolean: bool,
    possible_integer: bool,
    possible_float: bool,
    possible_date: bool,
    possible_datetime: bool,
    possible_time: bool,
    possible_guid: bool,
}

impl Default for TypeCandidate {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCandidate {
    pub fn new() -> Self {
        Self {
            non_empty: 0,
            possible_boolean: true,
            possible_integer: true,
            possible_float: true,
            possible_date: true,
            possible_datetime: true,
            possible_time: true,
            possible_guid: true,
        }
    }

    pub fn update(&mut self, value: &str) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        self.non_empty += 1;
        let lowered = trimmed.to_ascii_lowercase();
        // 0/1 stay integers; only word tokens make a boolean column.
        if self.possible_boolean
            && (matches!(lowered.as_str(), "0" | "1") || parse_boolean(&lowered).is_none())
        {
            self.possible_boolean = false;
        }
        if self.possible_integer && trimmed.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && trimmed.parse::<f64>().is_err() {
            self.possible_float = false;
        }
        if self.possible_date && parse_naive_date(trimmed).is_none() {
            self.possible_date = false;
        }
        if self.possible_datetime && parse_naive_datetime(trimmed).is_none() {
            self.possible_datetime = false;
        }
        if self.possible_time && parse_naive_time(trimmed).is_none() {
            self.possible_time = false;
        }
        if self.possible_guid
            && uuid::Uuid::parse_str(trimmed.trim_matches(|c| matches!(c, '{' | '}'))).is_err()
        {
            self.possible_guid = false;
        }
    }

    pub fn decide(&self) -> ColumnType {
        if self.non_empty == 0 {
            ColumnType::String
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else if self.possible_time {
            ColumnType::Time
        } else if self.possible_guid {
            ColumnType::Guid
        } else {
            ColumnType::String
        }
    }
}

/// Infers a column type from the kinds of JSON values observed for it.
#[derive(Debug, Clone, Default)]
pub struct JsonTypeCandidate {
    booleans: usize,
    integers: usize,
    floats: usize,
    strings: TypeCandidate,
    string_count: usize,
    nested: usize,
}

impl JsonTypeCandidate {
    pub fn update(&mut self, value: &serde_json::Value) {
        use serde_json::Value as Json;
        match value {
            Json::Null => {}
            Json::Bool(_) => self.booleans += 1,
            Json::Number(n) if n.is_i64() => self.integers += 1,
            Json::Number(_) => self.floats += 1,
            Json::String(s) => {
                self.string_count += 1;
                self.strings.update(s);
            }
            Json::Array(_) | Json::Object(_) => self.nested += 1,
        }
    }

    pub fn decide(&self) -> ColumnType {
        let numbers = self.integers + self.floats;
        let kinds = [self.booleans > 0, numbers > 0, self.string_count > 0, self.nested > 0]
            .iter()
            .filter(|seen| **seen)
            .count();
        if kinds != 1 {
            return ColumnType::String;
        }
        if self.booleans > 0 {
            ColumnType::Boolean
        } else if self.floats > 0 {
            ColumnType::Float
        } else if self.integers > 0 {
            ColumnType::Integer
        } else if self.string_count > 0 {
            // Only temporal and GUID strings earn a richer type; numeric-looking
            // strings stay text so "007" keeps its leading zeros.
            match self.strings.decide() {
                ty @ (ColumnType::Date | ColumnType::DateTime | ColumnType::Time | ColumnType::Guid) => ty,
                _ => ColumnType::String,
            }
        } else {
            ColumnType::String
        }
    }
}

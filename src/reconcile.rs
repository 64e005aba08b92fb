//! Lines the old and new schemas up before any row is read.
//!
//! Reconciliation validates the key list, locates each key column on both
//! sides, decides how key values are normalized when the declared types
//! disagree, and splits the remaining columns into the comparable set
//! (present on both sides) and schema drift (present on one side only).

use std::collections::HashSet;

use log::warn;

use crate::{
    error::{DiffError, MissingIn, Result, Side},
    schema::{ColumnType, Schema},
};

/// How a key column's values are prepared before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNormalization {
    /// Both sides declare the same type; values join as-is.
    Typed,
    /// Declared types differ; both sides join on the canonical text form.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: String,
    pub index_a: usize,
    pub index_b: usize,
    pub type_a: ColumnType,
    pub type_b: ColumnType,
    pub normalization: KeyNormalization,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparableColumn {
    pub name: String,
    pub index_a: usize,
    pub index_b: usize,
    pub type_a: ColumnType,
    pub type_b: ColumnType,
}

impl ComparableColumn {
    pub fn types_agree(&self) -> bool {
        self.type_a == self.type_b
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SchemaDrift {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
}

impl SchemaDrift {
    pub fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ReconciledSchema {
    pub schema_a: Schema,
    pub schema_b: Schema,
    pub keys: Vec<KeyColumn>,
    pub comparable: Vec<ComparableColumn>,
    pub drift: SchemaDrift,
}

impl ReconciledSchema {
    pub fn key_names(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.name.clone()).collect()
    }

    pub fn key_indices(&self, side: Side) -> Vec<usize> {
        self.keys
            .iter()
            .map(|k| match side {
                Side::Old => k.index_a,
                Side::New => k.index_b,
            })
            .collect()
    }
}

pub fn reconcile<S: AsRef<str>>(
    schema_a: &Schema,
    schema_b: &Schema,
    key_columns: &[S],
) -> Result<ReconciledSchema> {
    if key_columns.is_empty() {
        return Err(DiffError::EmptyKey);
    }
    let mut seen = HashSet::with_capacity(key_columns.len());
    for name in key_columns {
        if !seen.insert(name.as_ref()) {
            return Err(DiffError::DuplicateKeyColumn {
                column: name.as_ref().to_string(),
            });
        }
    }
    for (side, schema) in [(Side::Old, schema_a), (Side::New, schema_b)] {
        if let Some(duplicate) = schema.first_duplicate_name() {
            return Err(DiffError::invalid_schema(
                side,
                format!("column '{duplicate}' appears more than once"),
            ));
        }
    }

    let mut keys = Vec::with_capacity(key_columns.len());
    for name in key_columns {
        let name = name.as_ref();
        let (index_a, index_b) = match (schema_a.column_index(name), schema_b.column_index(name)) {
            (Some(a), Some(b)) => (a, b),
            (None, Some(_)) => return Err(missing(name, MissingIn::Old)),
            (Some(_), None) => return Err(missing(name, MissingIn::New)),
            (None, None) => return Err(missing(name, MissingIn::Both)),
        };
        let type_a = schema_a.columns[index_a].datatype;
        let type_b = schema_b.columns[index_b].datatype;
        let normalization = if type_a == type_b {
            KeyNormalization::Typed
        } else {
            warn!(
                "Key column '{}' is {} in the old schema and {} in the new one; joining on text",
                name, type_a, type_b
            );
            KeyNormalization::Text
        };
        keys.push(KeyColumn {
            name: name.to_string(),
            index_a,
            index_b,
            type_a,
            type_b,
            normalization,
        });
    }

    let key_set: HashSet<&str> = key_columns.iter().map(AsRef::as_ref).collect();
    let mut comparable = Vec::new();
    let mut drift = SchemaDrift::default();
    for (index_a, column) in schema_a.columns.iter().enumerate() {
        if key_set.contains(column.name.as_str()) {
            continue;
        }
        match schema_b.column_index(&column.name) {
            Some(index_b) => comparable.push(ComparableColumn {
                name: column.name.clone(),
                index_a,
                index_b,
                type_a: column.datatype,
                type_b: schema_b.columns[index_b].datatype,
            }),
            None => drift.only_in_a.push(column.name.clone()),
        }
    }
    drift.only_in_b = schema_b
        .columns
        .iter()
        .filter(|c| !key_set.contains(c.name.as_str()) && schema_a.column_index(&c.name).is_none())
        .map(|c| c.name.clone())
        .collect();

    if !drift.is_empty() {
        warn!(
            "Schema drift: only in old {:?}, only in new {:?}",
            drift.only_in_a, drift.only_in_b
        );
    }
    if comparable.is_empty() {
        warn!("No non-key columns are shared; only key presence will be compared");
    }

    Ok(ReconciledSchema {
        schema_a: schema_a.clone(),
        schema_b: schema_b.clone(),
        keys,
        comparable,
        drift,
    })
}

fn missing(column: &str, missing_in: MissingIn) -> DiffError {
    DiffError::MissingKeyColumn {
        column: column.to_string(),
        missing_in,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnMeta;

    fn schema(columns: &[(&str, ColumnType)]) -> Schema {
        Schema::new(
            columns
                .iter()
                .map(|(name, ty)| ColumnMeta::new(*name, *ty))
                .collect(),
        )
    }

    #[test]
    fn splits_comparable_columns_from_drift() {
        let a = schema(&[
            ("id", ColumnType::Integer),
            ("legacy", ColumnType::String),
            ("amount", ColumnType::Float),
            ("name", ColumnType::String),
        ]);
        let b = schema(&[
            ("name", ColumnType::String),
            ("id", ColumnType::Integer),
            ("amount", ColumnType::Decimal),
            ("added", ColumnType::Boolean),
        ]);
        let reconciled = reconcile(&a, &b, &["id"]).expect("reconcile");
        let names: Vec<&str> = reconciled.comparable.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["amount", "name"]);
        assert_eq!(reconciled.comparable[0].index_a, 2);
        assert_eq!(reconciled.comparable[0].index_b, 2);
        assert!(!reconciled.comparable[0].types_agree());
        assert_eq!(reconciled.comparable[1].index_b, 0);
        assert_eq!(reconciled.drift.only_in_a, vec!["legacy"]);
        assert_eq!(reconciled.drift.only_in_b, vec!["added"]);
        assert_eq!(reconciled.keys[0].index_b, 1);
        assert_eq!(reconciled.key_indices(Side::New), vec![1]);
    }

    #[test]
    fn key_type_mismatch_falls_back_to_text() {
        let a = schema(&[("id", ColumnType::Integer), ("v", ColumnType::String)]);
        let b = schema(&[("id", ColumnType::String), ("v", ColumnType::String)]);
        let reconciled = reconcile(&a, &b, &["id"]).unwrap();
        assert_eq!(reconciled.keys[0].normalization, KeyNormalization::Text);
        let same = reconcile(&a, &a, &["id"]).unwrap();
        assert_eq!(same.keys[0].normalization, KeyNormalization::Typed);
    }

    #[test]
    fn rejects_bad_key_lists() {
        let a = schema(&[("id", ColumnType::Integer)]);
        let empty: [&str; 0] = [];
        assert!(matches!(reconcile(&a, &a, &empty), Err(DiffError::EmptyKey)));
        assert!(matches!(
            reconcile(&a, &a, &["id", "id"]),
            Err(DiffError::DuplicateKeyColumn { .. })
        ));
    }

    #[test]
    fn reports_where_key_columns_are_missing() {
        let a = schema(&[("id", ColumnType::Integer), ("x", ColumnType::String)]);
        let b = schema(&[("id", ColumnType::Integer), ("y", ColumnType::String)]);
        let side_of = |keys: &[&str]| match reconcile(&a, &b, keys) {
            Err(DiffError::MissingKeyColumn { missing_in, .. }) => Some(missing_in),
            _ => None,
        };
        assert_eq!(side_of(&["y"]), Some(MissingIn::Old));
        assert_eq!(side_of(&["x"]), Some(MissingIn::New));
        assert_eq!(side_of(&["z"]), Some(MissingIn::Both));
    }

    #[test]
    fn duplicate_column_names_are_invalid() {
        let a = schema(&[("id", ColumnType::Integer), ("v", ColumnType::String)]);
        let b = schema(&[
            ("id", ColumnType::Integer),
            ("v", ColumnType::String),
            ("v", ColumnType::String),
        ]);
        assert!(matches!(
            reconcile(&a, &b, &["id"]),
            Err(DiffError::InvalidSchema { side: Side::New, .. })
        ));
    }

    #[test]
    fn key_only_schemas_still_reconcile() {
        let a = schema(&[("id", ColumnType::Integer)]);
        let reconciled = reconcile(&a, &a, &["id"]).unwrap();
        assert!(reconciled.comparable.is_empty());
        assert!(reconciled.drift.is_empty());
    }
}

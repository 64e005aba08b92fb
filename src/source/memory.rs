use std::collections::VecDeque;

use super::{Row, RowSource};
use crate::{
    data::Value,
    error::{DiffError, Result},
    schema::{ColumnMeta, ColumnType, Schema},
};

/// Rows held in memory under an explicit schema.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    schema: Schema,
    rows: VecDeque<Row>,
    rows_read: u64,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, schema: Schema, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: rows.into(),
            rows_read: 0,
        }
    }

    /// Starts a source from `(column, type)` pairs; rows are added with
    /// [`MemorySource::with_row`].
    pub fn builder(name: impl Into<String>, columns: &[(&str, ColumnType)]) -> Self {
        let schema = Schema::new(
            columns
                .iter()
                .map(|(column, ty)| ColumnMeta::new(*column, *ty))
                .collect(),
        );
        Self::new(name, schema, Vec::new())
    }

    pub fn with_row(mut self, values: Vec<Option<Value>>) -> Self {
        self.rows.push_back(Row::new(values));
        self
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for MemorySource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.rows.pop_front() else {
            return Ok(None);
        };
        self.rows_read += 1;
        if row.len() != self.schema.len() {
            return Err(DiffError::decode(
                &self.name,
                self.rows_read,
                format!("expected {} field(s) but found {}", self.schema.len(), row.len()),
            ));
        }
        Ok(Some(row))
    }
}

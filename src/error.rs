//! Typed failures surfaced by the diff engine and the row sources.
//!
//! Structural problems (bad key lists, missing key columns, undecodable
//! input, I/O) abort a comparison and come back as a [`DiffError`]. Per-row
//! anomalies such as null or duplicate keys never become errors; the engine
//! absorbs them into counters on the result.

use std::{fmt, io};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiffError>;

/// Which input a column or row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Old => f.write_str("old"),
            Side::New => f.write_str("new"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingIn {
    Old,
    New,
    Both,
}

impl fmt::Display for MissingIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingIn::Old => f.write_str("the old schema"),
            MissingIn::New => f.write_str("the new schema"),
            MissingIn::Both => f.write_str("both schemas"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Key column list cannot be empty")]
    EmptyKey,

    #[error("Key column '{column}' is listed more than once")]
    DuplicateKeyColumn { column: String },

    #[error("Key column '{column}' is missing from {missing_in}")]
    MissingKeyColumn { column: String, missing_in: MissingIn },

    #[error("Invalid {side} schema: {message}")]
    InvalidSchema { side: Side, message: String },

    #[error("Failed to decode {source_name} at record {record}: {message}")]
    Decode {
        source_name: String,
        record: u64,
        message: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Comparison cancelled")]
    Cancelled,
}

impl DiffError {
    pub fn decode(source_name: impl Into<String>, record: u64, message: impl Into<String>) -> Self {
        Self::Decode {
            source_name: source_name.into(),
            record,
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_schema(side: Side, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            side,
            message: message.into(),
        }
    }

    /// Structural failures happen before any row is read.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DiffError::EmptyKey
                | DiffError::DuplicateKeyColumn { .. }
                | DiffError::MissingKeyColumn { .. }
                | DiffError::InvalidSchema { .. }
        )
    }
}

/// A row carried a null in one of its key columns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Key column '{column}' is null")]
pub struct NullKey {
    pub column: String,
}

use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    error::{NullKey, Side},
    reconcile::{KeyNormalization, ReconciledSchema},
    source::Row,
};

/// The normalized key tuple of one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Vec<Value>);

impl Key {
    pub fn new(parts: Vec<Value>) -> Self {
        Key(parts)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// Display form used in samples and log lines, parts joined by `|`.
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(Value::as_display)
            .collect::<Vec<_>>()
            .join("|")
    }
}

struct KeyPart {
    name: String,
    index: usize,
    normalization: KeyNormalization,
}

/// Pulls the key tuple out of rows from one side of the comparison.
pub struct KeyIndexer {
    parts: Vec<KeyPart>,
}

impl KeyIndexer {
    pub fn new(reconciled: &ReconciledSchema, side: Side) -> Self {
        let parts = reconciled
            .keys
            .iter()
            .map(|key| KeyPart {
                name: key.name.clone(),
                index: match side {
                    Side::Old => key.index_a,
                    Side::New => key.index_b,
                },
                normalization: key.normalization,
            })
            .collect();
        Self { parts }
    }

    pub fn extract(&self, row: &Row) -> Result<Key, NullKey> {
        let mut values = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let value = row.get(part.index).ok_or_else(|| NullKey {
                column: part.name.clone(),
            })?;
            values.push(match part.normalization {
                KeyNormalization::Typed => value.clone(),
                KeyNormalization::Text => Value::String(value.as_display()),
            });
        }
        Ok(Key(values))
    }
}

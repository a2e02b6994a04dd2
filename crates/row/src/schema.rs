//! Table schemas, persisted as JSON under `schema/schema-<id>`.

use crate::datum::DataType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema validation errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema is incompatible: {0}")]
    Incompatible(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// An immutable table schema.
///
/// Partition keys and primary keys are named subsets of `fields`. The
/// **trimmed** primary key (primary key minus partition columns) is what
/// the LSM layers and the global index use as the record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub id: u64,
    pub fields: Vec<Field>,
    #[serde(rename = "partitionKeys")]
    pub partition_keys: Vec<String>,
    #[serde(rename = "primaryKeys")]
    pub primary_keys: Vec<String>,
}

impl Schema {
    /// Creates schema 0 for a new table.
    pub fn new(
        fields: Vec<(&str, DataType)>,
        partition_keys: &[&str],
        primary_keys: &[&str],
    ) -> Result<Self, SchemaError> {
        let fields: Vec<Field> = fields
            .into_iter()
            .enumerate()
            .map(|(i, (name, data_type))| Field {
                id: i as u32,
                name: name.to_string(),
                data_type,
            })
            .collect();
        let schema = Schema {
            id: 0,
            fields,
            partition_keys: partition_keys.iter().map(|s| s.to_string()).collect(),
            primary_keys: primary_keys.iter().map(|s| s.to_string()).collect(),
        };
        for name in schema.partition_keys.iter().chain(&schema.primary_keys) {
            schema.field_index(name)?;
        }
        Ok(schema)
    }

    /// Position of a named column.
    pub fn field_index(&self, name: &str) -> Result<usize, SchemaError> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| SchemaError::UnknownColumn(name.to_string()))
    }

    /// Positions of the partition columns, in partition-key order.
    pub fn partition_projection(&self) -> Result<Vec<usize>, SchemaError> {
        self.partition_keys
            .iter()
            .map(|n| self.field_index(n))
            .collect()
    }

    /// Positions of the **trimmed** primary key: the primary-key columns
    /// with partition columns removed. Empty means the table has no
    /// primary key (append-only).
    pub fn trimmed_primary_key_projection(&self) -> Result<Vec<usize>, SchemaError> {
        self.primary_keys
            .iter()
            .filter(|n| !self.partition_keys.contains(n))
            .map(|n| self.field_index(n))
            .collect()
    }

    /// `true` when the primary key does **not** cover every partition
    /// column — the configuration that requires the global index.
    #[must_use]
    pub fn cross_partition_update(&self) -> bool {
        !self.primary_keys.is_empty()
            && !self
                .partition_keys
                .iter()
                .all(|p| self.primary_keys.contains(p))
    }

    /// Checks that `other` can be read with this schema: same column
    /// names and types in the same positions.
    pub fn check_compatible(&self, other: &Schema) -> Result<(), SchemaError> {
        if self.fields.len() != other.fields.len() {
            return Err(SchemaError::Incompatible(format!(
                "field count changed: {} -> {}",
                self.fields.len(),
                other.fields.len()
            )));
        }
        for (a, b) in self.fields.iter().zip(&other.fields) {
            if a.name != b.name || a.data_type != b.data_type {
                return Err(SchemaError::Incompatible(format!(
                    "field '{}: {:?}' became '{}: {:?}'",
                    a.name, a.data_type, b.name, b.data_type
                )));
            }
        }
        if self.partition_keys != other.partition_keys {
            return Err(SchemaError::Incompatible(
                "partition keys changed".to_string(),
            ));
        }
        if self.primary_keys != other.primary_keys {
            return Err(SchemaError::Incompatible("primary keys changed".to_string()));
        }
        Ok(())
    }
}

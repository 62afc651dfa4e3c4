//! Table and column metadata records.
//!
//! These records are the connector's view of a declared table: which
//! column is the row id, how the remaining columns map onto
//! `(family, qualifier)` pairs, which of them are indexed, and which
//! serializer encodes their values. They are serde-serializable so an
//! external catalog can persist them as JSON.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};
use crate::indexing::keys;
use crate::serializer::{RowSerializer, SerializerKind};

/// Logical type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Bigint,
    Boolean,
    Double,
    Timestamp,
    Varchar,
    Array(Box<ColumnType>),
}

impl ColumnType {
    /// Element type when this is an array type.
    pub fn array_element(&self) -> Option<&ColumnType> {
        match self {
            ColumnType::Array(element) => Some(element),
            _ => None,
        }
    }
}

/// One column of a declared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub name: String,
    /// Storage column family; absent for the row-id column.
    pub family: Option<String>,
    /// Storage column qualifier; absent for the row-id column.
    pub qualifier: Option<String>,
    pub column_type: ColumnType,
    pub ordinal: usize,
    pub indexed: bool,
    #[serde(default)]
    pub comment: String,
}

/// A declared table: schema-qualified name, columns, row id, serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnRecord>,
    pub row_id: String,
    pub external: bool,
    pub serializer: SerializerKind,
    pub scan_auths: Option<String>,
}

impl TableRecord {
    /// Backing data-table name: `schema.table`, or the bare table name in
    /// the `default` schema.
    pub fn full_table_name(&self) -> String {
        full_table_name(&self.schema, &self.table)
    }

    pub fn index_table_name(&self) -> String {
        keys::index_table_name(&self.schema, &self.table)
    }

    pub fn metrics_table_name(&self) -> String {
        keys::metrics_table_name(&self.schema, &self.table)
    }

    /// True when any column carries the indexed flag.
    pub fn indexed(&self) -> bool {
        self.columns.iter().any(|column| column.indexed)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnRecord> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn row_id_column(&self) -> Option<&ColumnRecord> {
        self.column(&self.row_id)
    }

    pub fn indexed_columns(&self) -> impl Iterator<Item = &ColumnRecord> {
        self.columns.iter().filter(|column| column.indexed)
    }

    /// Instantiate the configured row serializer.
    pub fn serializer_instance(&self) -> Arc<dyn RowSerializer> {
        self.serializer.instance()
    }

    /// Insert `column` at its ordinal, rebuilding the column vector with
    /// updated ordinals for everything displaced after it.
    pub fn add_column(&mut self, column: ColumnRecord) -> Result<()> {
        if self.columns.iter().any(|c| c.name == column.name) {
            return Err(ConnectorError::Misconfiguration(format!(
                "column '{}' already exists in table '{}'",
                column.name,
                self.full_table_name()
            )));
        }
        if column.ordinal > self.columns.len() {
            return Err(ConnectorError::Misconfiguration(format!(
                "column '{}' ordinal {} is out of bounds",
                column.name, column.ordinal
            )));
        }

        if column.ordinal == self.columns.len() {
            self.columns.push(column);
            return Ok(());
        }

        let target = column.ordinal;
        let mut rebuilt = Vec::with_capacity(self.columns.len() + 1);
        let mut ordinal = 0usize;
        for existing in self.columns.drain(..) {
            if ordinal == target {
                let mut inserted = column.clone();
                inserted.ordinal = ordinal;
                rebuilt.push(inserted);
                ordinal += 1;
            }
            let mut shifted = existing;
            shifted.ordinal = ordinal;
            rebuilt.push(shifted);
            ordinal += 1;
        }
        self.columns = rebuilt;
        Ok(())
    }

    /// Check the record for the failure modes a declaration can carry.
    pub fn validate(&self) -> Result<()> {
        if self.columns.len() < 2 {
            return Err(ConnectorError::Misconfiguration(
                "table must have at least one non-row-id column".to_string(),
            ));
        }
        let row_id_column = self.row_id_column().ok_or_else(|| {
            ConnectorError::Misconfiguration(format!(
                "row id '{}' does not name a column of table '{}'",
                self.row_id,
                self.full_table_name()
            ))
        })?;
        if row_id_column.family.is_some() || row_id_column.qualifier.is_some() {
            return Err(ConnectorError::Misconfiguration(format!(
                "row id column '{}' must not carry a column mapping",
                row_id_column.name
            )));
        }

        for column in &self.columns {
            if column.name != self.row_id
                && (column.family.is_none() || column.qualifier.is_none())
            {
                return Err(ConnectorError::Misconfiguration(format!(
                    "column '{}' is missing its family/qualifier mapping",
                    column.name
                )));
            }
            if self
                .columns
                .iter()
                .filter(|other| other.name == column.name)
                .count()
                > 1
            {
                return Err(ConnectorError::Misconfiguration(format!(
                    "column '{}' is declared more than once",
                    column.name
                )));
            }
            if let Some(element) = column.column_type.array_element() {
                if matches!(element, ColumnType::Array(_)) {
                    return Err(ConnectorError::Misconfiguration(format!(
                        "column '{}' nests arrays inside arrays",
                        column.name
                    )));
                }
                if self.serializer == SerializerKind::String {
                    return Err(ConnectorError::Misconfiguration(format!(
                        "array column '{}' requires the lexicoder serializer",
                        column.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// `schema.table`, or the bare table name when the schema is `default`.
pub fn full_table_name(schema: &str, table: &str) -> String {
    if schema == "default" {
        table.to_string()
    } else {
        format!("{schema}.{table}")
    }
}

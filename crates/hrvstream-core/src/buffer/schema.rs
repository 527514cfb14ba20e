//! Column types, typed values and rows.

use crate::error::ContractViolation;
use crate::Result;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Declared scalar type of a buffer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// UTC timestamp, millisecond resolution
    Timestamp,
    /// UTF-8 string
    #[serde(rename = "string")]
    Utf8,
}

impl ColumnType {
    /// Arrow type used when materializing views.
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnType::Int => DataType::Int64,
            ColumnType::Float => DataType::Float64,
            ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
            ColumnType::Utf8 => DataType::Utf8,
        }
    }

    /// Whether values of this type can feed a numeric aggregate.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }

    /// Whether this type can order rows in time.
    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Int)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Utf8 => "string",
        };
        f.write_str(name)
    }
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Utf8(String),
}

impl Value {
    /// Timestamp from epoch milliseconds, `None` outside the representable range.
    pub fn timestamp_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Value::Timestamp)
    }

    /// The column type this value belongs to.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Utf8(_) => ColumnType::Utf8,
        }
    }

    /// Ordering key for time-window extraction, in milliseconds.
    pub fn as_time_key(&self) -> Option<i64> {
        match self {
            Value::Timestamp(ts) => Some(ts.timestamp_millis()),
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

/// Insert input: column name to value.
///
/// Rows are only carried into the buffer; their contents are copied into
/// column slots and the row itself is not retained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Get a field.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Iterate fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered, duplicate-free set of column declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSchema {
    columns: Vec<ColumnSpec>,
}

impl BufferSchema {
    /// Build a schema, rejecting duplicate column names.
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self::from_specs(
            columns
                .into_iter()
                .map(|(name, ty)| ColumnSpec::new(name, ty))
                .collect(),
        )
    }

    /// Build a schema from column specs.
    pub fn from_specs(columns: Vec<ColumnSpec>) -> Result<Self> {
        for (i, spec) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == spec.name) {
                return Err(ContractViolation::DuplicateColumn {
                    column: spec.name.clone(),
                }
                .into());
            }
        }
        Ok(Self { columns })
    }

    /// Column declarations in declaration order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Position of a column.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    /// Declared type of a column.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.column_type)
    }

    /// Whether the column is declared.
    pub fn contains(&self, column: &str) -> bool {
        self.index_of(column).is_some()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no columns are declared.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check a row against the schema without touching any storage.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        for spec in &self.columns {
            let value = row.get(&spec.name).ok_or_else(|| ContractViolation::MissingField {
                column: spec.name.clone(),
            })?;
            if value.column_type() != spec.column_type {
                return Err(ContractViolation::TypeMismatch {
                    column: spec.name.clone(),
                    expected: spec.column_type.to_string(),
                    actual: value.column_type().to_string(),
                }
                .into());
            }
        }

        if row.len() != self.columns.len() {
            if let Some((name, _)) = row.iter().find(|(name, _)| !self.contains(name)) {
                return Err(ContractViolation::UnknownColumn {
                    column: name.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Arrow schema for materialized views.
    pub fn to_arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), c.column_type.data_type(), false))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

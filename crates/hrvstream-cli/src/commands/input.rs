//! JSON row files.
//!
//! A row file is a JSON array of objects keyed by the declared columns.
//! Timestamps are integer epoch milliseconds or RFC 3339 strings.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use hrvstream_core::buffer::{BufferSchema, ColumnType, Row, Value};
use hrvstream_core::{ContractViolation, ReplayOutput};
use serde_json::{Map, Value as Json};
use std::path::Path;

/// Read and type a row file against `schema`.
pub fn read_rows(path: &Path, schema: &BufferSchema) -> Result<Vec<Row>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input {}", path.display()))?;
    parse_rows(&content, schema).with_context(|| format!("Invalid input {}", path.display()))
}

/// Parse rows from JSON text.
pub fn parse_rows(content: &str, schema: &BufferSchema) -> Result<Vec<Row>> {
    let json: Json = serde_json::from_str(content)?;
    let Json::Array(items) = json else {
        bail!("expected a JSON array of row objects");
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_row(item, schema).with_context(|| format!("row {i}")))
        .collect()
}

fn parse_row(item: &Json, schema: &BufferSchema) -> Result<Row> {
    let Json::Object(fields) = item else {
        bail!("expected an object, got {item}");
    };

    let mut row = Row::new();
    for (column, json) in fields {
        let ty = schema
            .column_type(column)
            .ok_or_else(|| ContractViolation::UnknownColumn {
                column: column.clone(),
            })
            .map_err(hrvstream_core::Error::from)?;
        row.set(column.clone(), parse_value(column, ty, json)?);
    }
    Ok(row)
}

fn parse_value(column: &str, ty: ColumnType, json: &Json) -> Result<Value> {
    let value = match (ty, json) {
        (ColumnType::Int, Json::Number(n)) => n.as_i64().map(Value::Int),
        (ColumnType::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
        (ColumnType::Timestamp, Json::Number(n)) => {
            n.as_i64().and_then(Value::timestamp_millis)
        }
        (ColumnType::Timestamp, Json::String(s)) => {
            let ts = DateTime::parse_from_rfc3339(s)
                .with_context(|| format!("column '{column}': invalid RFC 3339 timestamp"))?;
            Some(Value::Timestamp(ts.with_timezone(&Utc)))
        }
        (ColumnType::Utf8, Json::String(s)) => Some(Value::Utf8(s.clone())),
        _ => None,
    };

    value.ok_or_else(|| {
        anyhow::Error::new(hrvstream_core::Error::from(ContractViolation::TypeMismatch {
            column: column.to_string(),
            expected: ty.to_string(),
            actual: json.to_string(),
        }))
    })
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Int(v) => Json::from(*v),
        Value::Float(v) => Json::from(*v),
        Value::Timestamp(ts) => Json::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Value::Utf8(s) => Json::from(s.as_str()),
    }
}

/// Rows with one extra column per replay output, `null` where absent.
pub fn rows_with_results(rows: &[Row], outputs: &[ReplayOutput]) -> Json {
    let objects = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut object: Map<String, Json> = row
                .iter()
                .map(|(column, value)| (column.to_string(), value_to_json(value)))
                .collect();
            for output in outputs {
                let result = output.values.get(i).copied().flatten();
                // NaN and infinities have no JSON form.
                let json = result
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Json::Null, Json::Number);
                object.insert(output.aggregate.clone(), json);
            }
            Json::Object(object)
        })
        .collect();
    Json::Array(objects)
}

//! Progressive replay of a historical batch.
//!
//! Replays rows one insertion at a time into a fresh circular buffer and
//! evaluates an aggregate right after each insert, producing the column of
//! values a live streaming consumer would have observed.

use crate::aggregate::WindowedAggregate;
use crate::buffer::{BufferSchema, CircularBuffer, Row};
use crate::config::BufferConfig;
use crate::error::ContractViolation;
use crate::Result;
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{debug, info};

/// Replay driver: schema, capacity and the column that orders rows.
#[derive(Debug, Clone)]
pub struct ProgressiveReplay {
    schema: BufferSchema,
    capacity: usize,
    timestamp_column: String,
}

impl ProgressiveReplay {
    /// Create a replay driver.
    ///
    /// The timestamp column must be declared with a temporal type.
    pub fn new(
        schema: BufferSchema,
        capacity: usize,
        timestamp_column: impl Into<String>,
    ) -> Result<Self> {
        let timestamp_column = timestamp_column.into();
        match schema.column_type(&timestamp_column) {
            None => {
                return Err(ContractViolation::UnknownColumn {
                    column: timestamp_column,
                }
                .into())
            }
            Some(ty) if !ty.is_temporal() => {
                return Err(ContractViolation::TypeMismatch {
                    column: timestamp_column,
                    expected: "timestamp".into(),
                    actual: ty.to_string(),
                }
                .into())
            }
            Some(_) => {}
        }

        Ok(Self {
            schema,
            capacity,
            timestamp_column,
        })
    }

    /// Create a replay driver from buffer configuration.
    pub fn from_config(config: &BufferConfig) -> Result<Self> {
        Self::new(
            config.schema()?,
            config.capacity,
            config.timestamp_column.clone(),
        )
    }

    /// Buffer schema.
    pub fn schema(&self) -> &BufferSchema {
        &self.schema
    }

    /// Buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Column that orders rows in time.
    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// Replay `rows` and evaluate `aggregate` after every insert.
    ///
    /// Rows must be sorted by timestamp; the output is aligned row-for-row
    /// with the input.
    pub fn run<A>(&self, rows: &[Row], aggregate: &A) -> Result<ReplayOutput>
    where
        A: WindowedAggregate + ?Sized,
    {
        let timestamps = self.ordered_timestamps(rows)?;
        let mut buffer = CircularBuffer::new(self.schema.clone(), self.capacity);
        let mut values = Vec::with_capacity(rows.len());

        for row in rows {
            buffer.insert(row)?;
            values.push(aggregate.evaluate(&buffer)?);
        }

        let output = ReplayOutput {
            aggregate: aggregate.name().to_string(),
            timestamps,
            values,
        };

        info!(
            aggregate = %output.aggregate,
            rows = output.len(),
            valid = output.valid_count(),
            capacity = self.capacity,
            "Replay completed"
        );

        Ok(output)
    }

    /// Replay once and evaluate several aggregates after every insert.
    pub fn run_all(
        &self,
        rows: &[Row],
        aggregates: &[Box<dyn WindowedAggregate>],
    ) -> Result<Vec<ReplayOutput>> {
        let timestamps = self.ordered_timestamps(rows)?;
        let mut buffer = CircularBuffer::new(self.schema.clone(), self.capacity);
        let mut columns: Vec<Vec<Option<f64>>> = aggregates
            .iter()
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();

        for row in rows {
            buffer.insert(row)?;
            for (aggregate, column) in aggregates.iter().zip(columns.iter_mut()) {
                column.push(aggregate.evaluate(&buffer)?);
            }
        }

        let outputs: Vec<ReplayOutput> = aggregates
            .iter()
            .zip(columns)
            .map(|(aggregate, values)| ReplayOutput {
                aggregate: aggregate.name().to_string(),
                timestamps: timestamps.clone(),
                values,
            })
            .collect();

        info!(
            aggregates = outputs.len(),
            rows = rows.len(),
            capacity = self.capacity,
            "Replay completed"
        );

        Ok(outputs)
    }

    /// Independent buffer snapshot after every insert.
    pub fn trajectory(&self, rows: &[Row]) -> Result<Vec<CircularBuffer>> {
        self.ordered_timestamps(rows)?;
        let mut buffer = CircularBuffer::new(self.schema.clone(), self.capacity);
        let mut states = Vec::with_capacity(rows.len());

        for row in rows {
            buffer.insert(row)?;
            states.push(buffer.snapshot());
        }

        debug!(states = states.len(), "Replay trajectory captured");
        Ok(states)
    }

    /// Timestamps of `rows`, checking they are non-decreasing.
    fn ordered_timestamps(&self, rows: &[Row]) -> Result<Vec<i64>> {
        let timestamps = row_timestamps(rows, &self.timestamp_column)?;
        if let Some(index) = timestamps.windows(2).position(|w| w[1] < w[0]) {
            return Err(ContractViolation::UnsortedRows { index: index + 1 }.into());
        }
        Ok(timestamps)
    }
}

/// Replay `rows` through a fresh buffer of `capacity` slots.
pub fn replay<A>(
    schema: &BufferSchema,
    timestamp_column: &str,
    rows: &[Row],
    capacity: usize,
    aggregate: &A,
) -> Result<ReplayOutput>
where
    A: WindowedAggregate + ?Sized,
{
    ProgressiveReplay::new(schema.clone(), capacity, timestamp_column)?.run(rows, aggregate)
}

/// Stable-sort rows by their timestamp column.
pub fn sort_rows_by_timestamp(rows: &mut [Row], timestamp_column: &str) -> Result<()> {
    let keys = row_timestamps(rows, timestamp_column)?;
    let mut keyed: Vec<(i64, Row)> = keys
        .into_iter()
        .zip(rows.iter_mut().map(std::mem::take))
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
    Ok(())
}

fn row_timestamps(rows: &[Row], timestamp_column: &str) -> Result<Vec<i64>> {
    rows.iter()
        .map(|row| {
            let value = row
                .get(timestamp_column)
                .ok_or_else(|| ContractViolation::MissingField {
                    column: timestamp_column.to_string(),
                })?;
            value.as_time_key().ok_or_else(|| {
                ContractViolation::TypeMismatch {
                    column: timestamp_column.to_string(),
                    expected: "timestamp".into(),
                    actual: value.column_type().to_string(),
                }
                .into()
            })
        })
        .collect()
}

/// Copy rows into a record batch with the schema's column order.
pub fn rows_to_record_batch(schema: &BufferSchema, rows: &[Row]) -> Result<RecordBatch> {
    let mut buffer = CircularBuffer::new(schema.clone(), rows.len());
    for row in rows {
        buffer.insert(row)?;
    }
    buffer.as_view()
}

/// Per-row progressive results of one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutput {
    /// Aggregate name
    pub aggregate: String,
    /// Row timestamps in epoch milliseconds
    pub timestamps: Vec<i64>,
    /// Result observed after each row, `None` while data was insufficient
    pub values: Vec<Option<f64>>,
}

impl ReplayOutput {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no rows were replayed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of rows with a result.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// `(timestamp, value)` pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, Option<f64>)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }

    /// Results as a nullable Arrow column.
    pub fn to_arrow(&self) -> Float64Array {
        Float64Array::from(self.values.clone())
    }

    /// Append the results to `batch` as a new nullable column.
    ///
    /// `batch` must hold the replayed rows in the same order.
    pub fn append_to(&self, batch: &RecordBatch, column: &str) -> Result<RecordBatch> {
        let schema = batch.schema();
        let mut fields: Vec<Arc<Field>> = schema.fields().iter().cloned().collect();
        fields.push(Arc::new(Field::new(column, DataType::Float64, true)));

        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        columns.push(Arc::new(self.to_arrow()));

        let merged = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(merged)
    }
}

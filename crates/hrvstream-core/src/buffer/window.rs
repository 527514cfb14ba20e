//! Chronological views and trailing time windows.
//!
//! Physical slot order only matches insertion order until the buffer wraps.
//! After that the oldest row sits at `write_position` and the sequence wraps
//! through the end of the slot array.
//!
//! Views are materialized into Arrow `RecordBatch`es that own their arrays,
//! so a view stays valid however the buffer is mutated afterwards.

use super::circular::{CircularBuffer, ColumnSlots};
use super::schema::Value;
use crate::error::ContractViolation;
use crate::Result;
use arrow::array::{
    ArrayRef, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::TimeDelta;
use std::sync::Arc;
use tracing::debug;

/// First position in `ordered_timestamps` whose value is `>= threshold`.
///
/// Returns `0` if the threshold precedes every timestamp and the slice length
/// if it exceeds all of them. The slice must be non-decreasing.
pub fn binary_search_start(ordered_timestamps: &[i64], threshold: i64) -> usize {
    lower_bound(ordered_timestamps.len(), |i| ordered_timestamps[i] < threshold)
}

/// Lower-bound search over logical positions `0..len`.
fn lower_bound(len: usize, is_before: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if is_before(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

impl CircularBuffer {
    /// Physical slot of the `logical`-th oldest row.
    fn physical_slot(&self, logical: usize) -> usize {
        if self.has_wrapped() {
            (self.write_position() + logical) % self.max_size()
        } else {
            logical
        }
    }

    /// Slot indices in insertion order, oldest first.
    pub fn chronological_indices(&self) -> Vec<usize> {
        (0..self.len()).map(|i| self.physical_slot(i)).collect()
    }

    /// Value of `column` in the `logical`-th oldest row.
    pub fn value_at(&self, column: &str, logical: usize) -> Option<Value> {
        if logical >= self.len() {
            return None;
        }
        let (_, slots) = self.column_slots(column)?;
        Some(slots.read(self.physical_slot(logical)))
    }

    /// Value of `column` in the most recent row.
    pub fn latest(&self, column: &str) -> Option<Value> {
        self.value_at(column, self.len().checked_sub(1)?)
    }

    /// The newest `count` values of a numeric column, oldest first.
    ///
    /// Reads only that column. `None` while fewer than `count` rows are
    /// buffered.
    pub fn numeric_tail(&self, column: &str, count: usize) -> Result<Option<Vec<f64>>> {
        let (column_type, slots) =
            self.column_slots(column)
                .ok_or_else(|| ContractViolation::UnknownColumn {
                    column: column.to_string(),
                })?;
        if !column_type.is_numeric() {
            return Err(ContractViolation::TypeMismatch {
                column: column.to_string(),
                expected: "numeric".into(),
                actual: column_type.to_string(),
            }
            .into());
        }
        if self.len() < count {
            return Ok(None);
        }

        Ok(Some(
            (self.len() - count..self.len())
                .filter_map(|logical| slots.number(self.physical_slot(logical)))
                .collect(),
        ))
    }

    /// All buffered rows in insertion order.
    pub fn as_view(&self) -> Result<RecordBatch> {
        self.materialize(&self.chronological_indices())
    }

    /// Rows whose timestamp is at least `latest - duration`.
    ///
    /// - an absent or negative duration yields an empty view
    /// - a zero duration yields only the most recent row
    ///
    /// The timestamp column must exist and be temporal; timestamps are
    /// assumed non-decreasing in insertion order.
    pub fn time_window_view(
        &self,
        timestamp_column: &str,
        duration: Option<TimeDelta>,
    ) -> Result<RecordBatch> {
        let indices = self.time_window_indices(timestamp_column, duration)?;
        self.materialize(&indices)
    }

    /// Slot indices of [`time_window_view`](Self::time_window_view).
    pub fn time_window_indices(
        &self,
        timestamp_column: &str,
        duration: Option<TimeDelta>,
    ) -> Result<Vec<usize>> {
        let timestamps = self.time_column(timestamp_column)?;

        if self.is_empty() {
            return Ok(Vec::new());
        }

        let duration = match duration {
            Some(d) if d >= TimeDelta::zero() => d,
            _ => {
                debug!(duration = ?duration, "Degenerate window duration, returning empty view");
                return Ok(Vec::new());
            }
        };

        let last = self.len() - 1;
        if duration.is_zero() {
            return Ok(vec![self.physical_slot(last)]);
        }

        let key_at = |logical: usize| timestamps.time_key(self.physical_slot(logical)).unwrap_or(i64::MIN);
        let latest = key_at(last);
        let threshold = latest.saturating_sub(duration.num_milliseconds());
        let start = lower_bound(self.len(), |i| key_at(i) < threshold);

        Ok((start..self.len()).map(|i| self.physical_slot(i)).collect())
    }

    /// Timestamps in insertion order, in epoch milliseconds.
    pub fn chronological_timestamps(&self, timestamp_column: &str) -> Result<Vec<i64>> {
        let timestamps = self.time_column(timestamp_column)?;
        Ok(self
            .chronological_indices()
            .into_iter()
            .filter_map(|slot| timestamps.time_key(slot))
            .collect())
    }

    fn time_column(&self, column: &str) -> Result<&ColumnSlots> {
        let (column_type, slots) =
            self.column_slots(column)
                .ok_or_else(|| ContractViolation::UnknownColumn {
                    column: column.to_string(),
                })?;
        if !column_type.is_temporal() {
            return Err(ContractViolation::TypeMismatch {
                column: column.to_string(),
                expected: "timestamp".into(),
                actual: column_type.to_string(),
            }
            .into());
        }
        Ok(slots)
    }

    /// Copy the given slots, in order, into a new record batch.
    fn materialize(&self, indices: &[usize]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = self
            .slots
            .iter()
            .map(|column| -> ArrayRef {
                match column {
                    ColumnSlots::Int(v) => {
                        Arc::new(Int64Array::from_iter_values(indices.iter().map(|&i| v[i])))
                    }
                    ColumnSlots::Float(v) => {
                        Arc::new(Float64Array::from_iter_values(indices.iter().map(|&i| v[i])))
                    }
                    ColumnSlots::Timestamp(v) => Arc::new(
                        TimestampMillisecondArray::from_iter_values(indices.iter().map(|&i| v[i])),
                    ),
                    ColumnSlots::Utf8(v) => Arc::new(StringArray::from_iter_values(
                        indices.iter().map(|&i| v[i].as_str()),
                    )),
                }
            })
            .collect();

        let options = RecordBatchOptions::new().with_row_count(Some(indices.len()));
        let batch =
            RecordBatch::try_new_with_options(self.schema().to_arrow_schema(), columns, &options)?;
        Ok(batch)
    }
}

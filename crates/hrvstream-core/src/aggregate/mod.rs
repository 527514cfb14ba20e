//! Windowed aggregates over the circular buffer.
//!
//! An aggregate reads an immutable view of the buffer and returns an optional
//! scalar: `Ok(None)` means the buffer does not hold enough rows yet, `Err` is
//! reserved for contract violations such as an unknown column or an invalid
//! parameter.
//!
//! Closures of type `Fn(&CircularBuffer) -> Result<Option<f64>>` are
//! aggregates too, so new strategies can be driven through replay without
//! touching the buffer or the replay loop.

mod rmssd;
mod smoothing;

pub use rmssd::{rmssd, rmssd_of, Rmssd, DEFAULT_VALUE_COLUMN};
pub use smoothing::{
    cascaded_median_filter, cascaded_smoothing_filter, exponential_moving_average,
    median_filter, moving_average, upper_median, CascadedMedianFilter, CascadedSmoothingFilter,
    ExponentialMovingAverage, MedianFilter, MovingAverage,
};

use crate::buffer::CircularBuffer;
use crate::error::ContractViolation;
use crate::Result;
use arrow::array::{Array, Float64Array, Int64Array};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

/// A windowed statistic evaluated against the current buffer state.
pub trait WindowedAggregate {
    /// Name used for result columns and logs.
    fn name(&self) -> &str {
        "custom"
    }

    /// Evaluate against the buffer as it is now.
    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>>;
}

impl<F> WindowedAggregate for F
where
    F: Fn(&CircularBuffer) -> Result<Option<f64>>,
{
    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        self(buffer)
    }
}

/// A closure with a name attached.
pub struct NamedAggregate<F> {
    name: String,
    f: F,
}

impl<F> NamedAggregate<F>
where
    F: Fn(&CircularBuffer) -> Result<Option<f64>>,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> WindowedAggregate for NamedAggregate<F>
where
    F: Fn(&CircularBuffer) -> Result<Option<f64>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        (self.f)(buffer)
    }
}

/// Extract a numeric column of a view as `f64`, in row order.
///
/// `Int64` columns are widened; any other type is a contract violation.
pub fn numeric_values(view: &RecordBatch, column: &str) -> Result<Vec<f64>> {
    let array = view
        .column_by_name(column)
        .ok_or_else(|| ContractViolation::UnknownColumn {
            column: column.to_string(),
        })?;

    match array.data_type() {
        DataType::Float64 => {
            let values = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| type_mismatch(column, array.data_type()))?;
            Ok(values.values().to_vec())
        }
        DataType::Int64 => {
            let values = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| type_mismatch(column, array.data_type()))?;
            Ok(values.values().iter().map(|&v| v as f64).collect())
        }
        other => Err(type_mismatch(column, other).into()),
    }
}

fn type_mismatch(column: &str, actual: &DataType) -> ContractViolation {
    ContractViolation::TypeMismatch {
        column: column.to_string(),
        expected: "numeric".into(),
        actual: actual.to_string(),
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

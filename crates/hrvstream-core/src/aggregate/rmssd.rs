//! Root Mean Square of Successive Differences over a trailing time window.

use super::{mean, numeric_values, WindowedAggregate};
use crate::buffer::CircularBuffer;
use crate::Result;
use chrono::TimeDelta;
use tracing::debug;

/// Value column RMSSD reads when none is given.
pub const DEFAULT_VALUE_COLUMN: &str = "ppi";

/// RMSSD of a series: `sqrt(mean((x[i+1] - x[i])^2))`.
///
/// `None` for fewer than two values.
pub fn rmssd_of(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let squared: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]).powi(2)).collect();
    mean(&squared).map(f64::sqrt)
}

/// RMSSD of `value_column` over the rows of the trailing `duration` window.
///
/// Returns `None` when the window holds fewer than two rows or the value
/// column is not part of the buffer. An unknown timestamp column is a
/// contract violation.
pub fn rmssd(
    buffer: &CircularBuffer,
    timestamp_column: &str,
    duration: Option<TimeDelta>,
    value_column: &str,
) -> Result<Option<f64>> {
    let view = buffer.time_window_view(timestamp_column, duration)?;

    if !buffer.schema().contains(value_column) {
        debug!(column = value_column, "RMSSD value column absent");
        return Ok(None);
    }
    if view.num_rows() < 2 {
        return Ok(None);
    }

    let values = numeric_values(&view, value_column)?;
    Ok(rmssd_of(&values))
}

/// RMSSD aggregate bound to a column pair and window length.
#[derive(Debug, Clone)]
pub struct Rmssd {
    name: String,
    timestamp_column: String,
    value_column: String,
    window: Option<TimeDelta>,
}

impl Rmssd {
    /// RMSSD over [`DEFAULT_VALUE_COLUMN`].
    pub fn new(timestamp_column: impl Into<String>, window: Option<TimeDelta>) -> Self {
        let name = match window {
            Some(w) => format!("rmssd_{}ms", w.num_milliseconds()),
            None => "rmssd".to_string(),
        };
        Self {
            name,
            timestamp_column: timestamp_column.into(),
            value_column: DEFAULT_VALUE_COLUMN.to_string(),
            window,
        }
    }

    /// Read a different value column.
    pub fn with_value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = column.into();
        self
    }

    /// Override the aggregate name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl WindowedAggregate for Rmssd {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        rmssd(
            buffer,
            &self.timestamp_column,
            self.window,
            &self.value_column,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferSchema, ColumnType, Row, Value};

    fn create_test_buffer(points: &[(i64, f64)]) -> CircularBuffer {
        let schema = BufferSchema::new([
            ("timestamp", ColumnType::Timestamp),
            ("ppi", ColumnType::Float),
        ])
        .unwrap();
        let mut buffer = CircularBuffer::new(schema, 64);
        for &(millis, ppi) in points {
            let row = Row::new()
                .with("timestamp", Value::timestamp_millis(millis).unwrap())
                .with("ppi", ppi);
            buffer.insert(&row).unwrap();
        }
        buffer
    }

    /// Timestamps accumulated from the intervals themselves.
    fn accumulate(intervals: &[f64]) -> Vec<(i64, f64)> {
        let mut t = 0i64;
        intervals
            .iter()
            .map(|&ppi| {
                t += ppi as i64;
                (t, ppi)
            })
            .collect()
    }

    #[test]
    fn test_rmssd_known_value() {
        let buffer = create_test_buffer(&accumulate(&[800.0, 850.0, 820.0, 880.0, 810.0]));
        let value = rmssd(&buffer, "timestamp", Some(TimeDelta::seconds(60)), "ppi")
            .unwrap()
            .unwrap();
        assert!((value - 2975f64.sqrt()).abs() < 1e-9);
        assert!((value - 54.543_560_573).abs() < 1e-6);
    }

    #[test]
    fn test_rmssd_constant_signal() {
        let buffer = create_test_buffer(&accumulate(&[900.0; 6]));
        let value = rmssd(&buffer, "timestamp", Some(TimeDelta::seconds(60)), "ppi").unwrap();
        assert_eq!(value, Some(0.0));
    }

    #[test]
    fn test_rmssd_needs_two_rows() {
        let buffer = create_test_buffer(&[(0, 800.0)]);
        let value = rmssd(&buffer, "timestamp", Some(TimeDelta::seconds(60)), "ppi").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_rmssd_window_limits_rows() {
        // Only the last two rows fall inside a 1s window.
        let buffer = create_test_buffer(&[(0, 700.0), (3000, 800.0), (3800, 850.0)]);
        let value = rmssd(&buffer, "timestamp", Some(TimeDelta::seconds(1)), "ppi")
            .unwrap()
            .unwrap();
        assert!((value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rmssd_zero_window_is_insufficient() {
        let buffer = create_test_buffer(&accumulate(&[800.0, 850.0, 820.0]));
        let value = rmssd(&buffer, "timestamp", Some(TimeDelta::zero()), "ppi").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_rmssd_absent_value_column() {
        let buffer = create_test_buffer(&accumulate(&[800.0, 850.0, 820.0]));
        let value = rmssd(&buffer, "timestamp", Some(TimeDelta::seconds(60)), "rr").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_rmssd_unknown_timestamp_column() {
        let buffer = create_test_buffer(&accumulate(&[800.0, 850.0]));
        assert!(rmssd(&buffer, "ts", Some(TimeDelta::seconds(60)), "ppi").is_err());
    }

    #[test]
    fn test_rmssd_aggregate() {
        let buffer = create_test_buffer(&accumulate(&[800.0, 850.0, 820.0, 880.0, 810.0]));
        let aggregate = Rmssd::new("timestamp", Some(TimeDelta::seconds(30)));
        assert_eq!(aggregate.name(), "rmssd_30000ms");
        let value = aggregate.evaluate(&buffer).unwrap().unwrap();
        assert!((value - 54.543_560_573).abs() < 1e-6);
    }

    #[test]
    fn test_rmssd_of() {
        assert_eq!(rmssd_of(&[]), None);
        assert_eq!(rmssd_of(&[1.0]), None);
        assert_eq!(rmssd_of(&[1.0, 4.0]), Some(3.0));
    }
}

//! Smoothing aggregates over the full chronological buffer content.
//!
//! All of these read the buffer in insertion order and use its most recent
//! values; they return `None` while the buffer holds fewer rows than they
//! need. The median used throughout is the element at index `len / 2` of the
//! sorted window, i.e. the upper-middle element for even window sizes.

use super::{mean, WindowedAggregate};
use crate::buffer::CircularBuffer;
use crate::error::ContractViolation;
use crate::Result;

/// Width of the cascaded median filter.
const CASCADE_WIDTH: usize = 5;

/// Sorted element at index `len / 2`, `None` for an empty slice.
pub fn upper_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(sorted[sorted.len() / 2])
}

fn median_of_three(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).min(a.min(b).max(c))
}

fn require_window(parameter: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(ContractViolation::InvalidWindowSize {
            parameter: parameter.to_string(),
            value,
        }
        .into());
    }
    Ok(())
}

/// Mean of the last `window_size` values.
pub fn moving_average(
    buffer: &CircularBuffer,
    window_size: usize,
    value_column: &str,
) -> Result<Option<f64>> {
    require_window("window_size", window_size)?;
    let Some(values) = buffer.numeric_tail(value_column, window_size)? else {
        return Ok(None);
    };
    Ok(mean(&values))
}

/// Upper median of the last `window_size` values.
pub fn median_filter(
    buffer: &CircularBuffer,
    window_size: usize,
    value_column: &str,
) -> Result<Option<f64>> {
    require_window("window_size", window_size)?;
    let Some(values) = buffer.numeric_tail(value_column, window_size)? else {
        return Ok(None);
    };
    Ok(upper_median(&values))
}

/// Two-stage median over the last five values.
///
/// The three interior values are replaced by the median of themselves and
/// their neighbours (computed from the unfiltered values), the two edge values
/// pass through, and the median of the resulting five is returned.
pub fn cascaded_median_filter(buffer: &CircularBuffer, value_column: &str) -> Result<Option<f64>> {
    let Some(window) = buffer.numeric_tail(value_column, CASCADE_WIDTH)? else {
        return Ok(None);
    };

    let mut filtered = window.to_vec();
    for i in 1..CASCADE_WIDTH - 1 {
        filtered[i] = median_of_three(window[i - 1], window[i], window[i + 1]);
    }

    Ok(upper_median(&filtered))
}

/// Exponential moving average seeded with the oldest buffered value.
///
/// `alpha` must lie in `(0, 1]`.
pub fn exponential_moving_average(
    buffer: &CircularBuffer,
    alpha: f64,
    value_column: &str,
) -> Result<Option<f64>> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(ContractViolation::InvalidAlpha { alpha }.into());
    }
    let values = buffer
        .numeric_tail(value_column, buffer.len())?
        .unwrap_or_default();
    let Some((&first, rest)) = values.split_first() else {
        return Ok(None);
    };

    let ema = rest
        .iter()
        .fold(first, |ema, &v| alpha * v + (1.0 - alpha) * ema);
    Ok(Some(ema))
}

/// Median filter followed by a moving average.
///
/// Takes the last `median_window + ma_window` values, replaces every position
/// that has a full centered window of width `median_window` with that
/// window's upper median (edges pass through), then averages the final
/// `ma_window` values. Windows whose combined width overflows `usize` can
/// never be filled and yield `None`.
pub fn cascaded_smoothing_filter(
    buffer: &CircularBuffer,
    median_window: usize,
    ma_window: usize,
    value_column: &str,
) -> Result<Option<f64>> {
    require_window("median_window", median_window)?;
    require_window("ma_window", ma_window)?;

    let Some(span) = median_window.checked_add(ma_window) else {
        return Ok(None);
    };
    let Some(tail) = buffer.numeric_tail(value_column, span)? else {
        return Ok(None);
    };

    let half = median_window / 2;
    let mut filtered = tail.to_vec();
    for (i, slot) in filtered
        .iter_mut()
        .enumerate()
        .take(span - median_window + half + 1)
        .skip(half)
    {
        let start = i - half;
        if let Some(median) = upper_median(&tail[start..start + median_window]) {
            *slot = median;
        }
    }

    Ok(mean(&filtered[span - ma_window..]))
}

/// Moving average aggregate.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    name: String,
    value_column: String,
    window_size: usize,
}

impl MovingAverage {
    pub fn new(value_column: impl Into<String>, window_size: usize) -> Self {
        Self {
            name: format!("moving_average_{}", window_size),
            value_column: value_column.into(),
            window_size,
        }
    }

    /// Override the aggregate name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl WindowedAggregate for MovingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        moving_average(buffer, self.window_size, &self.value_column)
    }
}

/// Median filter aggregate.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    name: String,
    value_column: String,
    window_size: usize,
}

impl MedianFilter {
    pub fn new(value_column: impl Into<String>, window_size: usize) -> Self {
        Self {
            name: format!("median_filter_{}", window_size),
            value_column: value_column.into(),
            window_size,
        }
    }

    /// Override the aggregate name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl WindowedAggregate for MedianFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        median_filter(buffer, self.window_size, &self.value_column)
    }
}

/// Cascaded median filter aggregate.
#[derive(Debug, Clone)]
pub struct CascadedMedianFilter {
    name: String,
    value_column: String,
}

impl CascadedMedianFilter {
    pub fn new(value_column: impl Into<String>) -> Self {
        Self {
            name: "cascaded_median_filter".to_string(),
            value_column: value_column.into(),
        }
    }

    /// Override the aggregate name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl WindowedAggregate for CascadedMedianFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        cascaded_median_filter(buffer, &self.value_column)
    }
}

/// Exponential moving average aggregate.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    name: String,
    value_column: String,
    alpha: f64,
}

impl ExponentialMovingAverage {
    pub fn new(value_column: impl Into<String>, alpha: f64) -> Self {
        Self {
            name: format!("ema_{}", alpha),
            value_column: value_column.into(),
            alpha,
        }
    }

    /// Override the aggregate name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl WindowedAggregate for ExponentialMovingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        exponential_moving_average(buffer, self.alpha, &self.value_column)
    }
}

/// Cascaded median + moving average aggregate.
#[derive(Debug, Clone)]
pub struct CascadedSmoothingFilter {
    name: String,
    value_column: String,
    median_window: usize,
    ma_window: usize,
}

impl CascadedSmoothingFilter {
    pub fn new(value_column: impl Into<String>, median_window: usize, ma_window: usize) -> Self {
        Self {
            name: format!("cascaded_smoothing_{}_{}", median_window, ma_window),
            value_column: value_column.into(),
            median_window,
            ma_window,
        }
    }

    /// Override the aggregate name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl WindowedAggregate for CascadedSmoothingFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, buffer: &CircularBuffer) -> Result<Option<f64>> {
        cascaded_smoothing_filter(
            buffer,
            self.median_window,
            self.ma_window,
            &self.value_column,
        )
    }
}

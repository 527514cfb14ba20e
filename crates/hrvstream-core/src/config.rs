//! Configuration structures for hrvstream.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use crate::aggregate::{
    CascadedMedianFilter, CascadedSmoothingFilter, ExponentialMovingAverage, MedianFilter,
    MovingAverage, Rmssd, WindowedAggregate,
};
use crate::buffer::{BufferSchema, ColumnSpec, ColumnType};
use crate::{Error, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Circular buffer configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Aggregates evaluated after every insert
    #[serde(default = "default_aggregates")]
    pub aggregates: Vec<AggregateConfig>,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            aggregates: default_aggregates(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

/// Circular buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Number of rows retained
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Column that orders rows in time
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    /// Column the aggregates read
    #[serde(default = "default_value_column")]
    pub value_column: String,

    /// Declared columns, in view order
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnSpec>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            timestamp_column: default_timestamp_column(),
            value_column: default_value_column(),
            columns: default_columns(),
        }
    }
}

impl BufferConfig {
    /// Buffer schema from the declared columns.
    pub fn schema(&self) -> Result<BufferSchema> {
        BufferSchema::from_specs(self.columns.clone())
            .map_err(|e| Error::Config(format!("Invalid buffer columns: {e}")))
    }

    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Config("At least one buffer column required".into()));
        }

        let schema = self.schema()?;

        match schema.column_type(&self.timestamp_column) {
            None => {
                return Err(Error::Config(format!(
                    "Timestamp column '{}' is not declared",
                    self.timestamp_column
                )))
            }
            Some(ty) if !ty.is_temporal() => {
                return Err(Error::Config(format!(
                    "Timestamp column '{}' must be timestamp or int, got {}",
                    self.timestamp_column, ty
                )))
            }
            Some(_) => {}
        }

        match schema.column_type(&self.value_column) {
            None => {
                return Err(Error::Config(format!(
                    "Value column '{}' is not declared",
                    self.value_column
                )))
            }
            Some(ty) if !ty.is_numeric() => {
                return Err(Error::Config(format!(
                    "Value column '{}' must be numeric, got {}",
                    self.value_column, ty
                )))
            }
            Some(_) => {}
        }

        if self.capacity == 0 {
            tracing::warn!("Buffer capacity is 0, every aggregate will report no data");
        }

        Ok(())
    }
}

/// One configured aggregate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregateConfig {
    /// Result column name
    pub name: String,

    /// Statistic and its parameters
    #[serde(flatten)]
    pub kind: AggregateKind,
}

/// Supported statistics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateKind {
    /// RMSSD over a trailing time window
    Rmssd {
        /// Window length in seconds; omitted means an empty window
        window_seconds: Option<f64>,
    },
    /// Mean of the last N values
    MovingAverage { window_size: usize },
    /// Upper median of the last N values
    MedianFilter { window_size: usize },
    /// Two-stage median over the last five values
    CascadedMedianFilter,
    /// Exponential moving average over the whole buffer
    ExponentialMovingAverage { alpha: f64 },
    /// Centered median followed by a moving average
    CascadedSmoothingFilter {
        median_window: usize,
        moving_average_window: usize,
    },
}

impl AggregateConfig {
    /// Build the aggregate bound to the configured columns.
    pub fn build(
        &self,
        timestamp_column: &str,
        value_column: &str,
    ) -> Result<Box<dyn WindowedAggregate>> {
        self.validate()?;

        let aggregate: Box<dyn WindowedAggregate> = match &self.kind {
            AggregateKind::Rmssd { window_seconds } => {
                let window = window_seconds.map(seconds_to_delta);
                Box::new(
                    Rmssd::new(timestamp_column, window)
                        .with_value_column(value_column)
                        .with_name(&self.name),
                )
            }
            AggregateKind::MovingAverage { window_size } => {
                Box::new(MovingAverage::new(value_column, *window_size).with_name(&self.name))
            }
            AggregateKind::MedianFilter { window_size } => {
                Box::new(MedianFilter::new(value_column, *window_size).with_name(&self.name))
            }
            AggregateKind::CascadedMedianFilter => {
                Box::new(CascadedMedianFilter::new(value_column).with_name(&self.name))
            }
            AggregateKind::ExponentialMovingAverage { alpha } => Box::new(
                ExponentialMovingAverage::new(value_column, *alpha).with_name(&self.name),
            ),
            AggregateKind::CascadedSmoothingFilter {
                median_window,
                moving_average_window,
            } => Box::new(
                CascadedSmoothingFilter::new(value_column, *median_window, *moving_average_window)
                    .with_name(&self.name),
            ),
        };

        Ok(aggregate)
    }

    /// Rows the aggregate needs before it reports a value.
    pub fn min_rows(&self) -> usize {
        match &self.kind {
            AggregateKind::Rmssd { .. } => 2,
            AggregateKind::MovingAverage { window_size }
            | AggregateKind::MedianFilter { window_size } => *window_size,
            AggregateKind::CascadedMedianFilter => 5,
            AggregateKind::ExponentialMovingAverage { .. } => 1,
            AggregateKind::CascadedSmoothingFilter {
                median_window,
                moving_average_window,
            } => median_window.saturating_add(*moving_average_window),
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> {
            Err(Error::Config(format!(
                "Invalid aggregate '{}': {}",
                self.name, reason
            )))
        };

        if self.name.is_empty() {
            return Err(Error::Config("Aggregate name is required".into()));
        }

        match &self.kind {
            AggregateKind::Rmssd {
                window_seconds: Some(seconds),
            } if !seconds.is_finite() || *seconds < 0.0 => {
                invalid(format!("window_seconds must be finite and >= 0, got {seconds}"))
            }
            AggregateKind::MovingAverage { window_size: 0 }
            | AggregateKind::MedianFilter { window_size: 0 } => {
                invalid("window_size must be positive".into())
            }
            AggregateKind::ExponentialMovingAverage { alpha } if !(*alpha > 0.0 && *alpha <= 1.0) => {
                invalid(format!("alpha must be in (0, 1], got {alpha}"))
            }
            AggregateKind::CascadedSmoothingFilter {
                median_window,
                moving_average_window,
            } if *median_window == 0 || *moving_average_window == 0 => {
                invalid("median_window and moving_average_window must be positive".into())
            }
            _ => Ok(()),
        }
    }
}

fn seconds_to_delta(seconds: f64) -> TimeDelta {
    TimeDelta::milliseconds((seconds * 1000.0).round() as i64)
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_capacity() -> usize {
    300
}
fn default_timestamp_column() -> String {
    "timestamp".into()
}
fn default_value_column() -> String {
    crate::aggregate::DEFAULT_VALUE_COLUMN.into()
}
fn default_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(default_timestamp_column(), ColumnType::Timestamp),
        ColumnSpec::new(default_value_column(), ColumnType::Float),
    ]
}
fn default_aggregates() -> Vec<AggregateConfig> {
    vec![AggregateConfig {
        name: "rmssd_30s".into(),
        kind: AggregateKind::Rmssd {
            window_seconds: Some(30.0),
        },
    }]
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.buffer.validate()?;

        if self.aggregates.is_empty() {
            return Err(Error::Config("At least one aggregate required".into()));
        }

        let mut seen = HashSet::new();
        for aggregate in &self.aggregates {
            if !seen.insert(aggregate.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate aggregate name '{}'",
                    aggregate.name
                )));
            }
            aggregate.validate()?;

            if aggregate.min_rows() > self.buffer.capacity {
                tracing::warn!(
                    aggregate = %aggregate.name,
                    min_rows = aggregate.min_rows(),
                    capacity = self.buffer.capacity,
                    "Aggregate needs more rows than the buffer holds and will never report a value"
                );
            }
        }

        Ok(())
    }

    /// Build every configured aggregate against the buffer columns.
    pub fn build_aggregates(&self) -> Result<Vec<Box<dyn WindowedAggregate>>> {
        self.aggregates
            .iter()
            .map(|a| a.build(&self.buffer.timestamp_column, &self.buffer.value_column))
            .collect()
    }
}

//! hrvstream core - windowed time-series engine for heart rate variability
//!
//! This library keeps the most recent samples of a PPI stream in memory and
//! computes windowed statistics over them:
//!
//! - Fixed-capacity circular buffer with typed columns and Arrow views
//! - Trailing time windows located by binary search over timestamps
//! - RMSSD and a family of smoothing filters as pluggable aggregates
//! - Progressive replay of historical batches and artifact impact evaluation

pub mod aggregate;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;

// Re-export commonly used types
pub use aggregate::{NamedAggregate, WindowedAggregate};
pub use buffer::{BufferSchema, CircularBuffer, ColumnType, Row, Value};
pub use config::Config;
pub use engine::{ImpactSummary, ProgressiveReplay, ReplayOutput};
pub use error::ContractViolation;
pub use error::{Error, Result};

//! Error types for hrvstream core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! "Not enough data yet" is never an error: aggregates report it as `Ok(None)`.

use thiserror::Error;

/// Result type alias for hrvstream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for hrvstream.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller broke the API contract (wrong column, bad parameter, ...)
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// Arrow view materialization error
    #[error("Arrow error: {0}")]
    Arrow(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Programmer or configuration errors.
///
/// These are reported at the call that made them and are not meant to be
/// retried; the call site has to be fixed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractViolation {
    /// Column is not declared in the buffer schema
    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    /// Row is missing a declared column
    #[error("Row is missing field: {column}")]
    MissingField { column: String },

    /// Value or column has the wrong type
    #[error("Type mismatch on column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// Column declared twice
    #[error("Duplicate column: {column}")]
    DuplicateColumn { column: String },

    /// EMA smoothing factor outside (0, 1]
    #[error("Invalid alpha {alpha}: must be in (0, 1]")]
    InvalidAlpha { alpha: f64 },

    /// A window size that must be positive was not
    #[error("Invalid window size for {parameter}: {value}")]
    InvalidWindowSize { parameter: String, value: usize },

    /// Replay batch is not ordered by timestamp
    #[error("Rows not sorted by timestamp at index {index}")]
    UnsortedRows { index: usize },
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Error::Arrow(err.to_string())
    }
}

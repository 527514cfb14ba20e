//! Circular windowed buffer with chronological and time-window views.
//!
//! The buffer keeps the most recent rows of a PPI stream in fixed-size typed
//! column slots. Views reorder the slots into insertion order and trim them to
//! a trailing time window with a binary search over timestamps.

mod circular;
mod schema;
mod window;

pub use circular::{BufferStats, CircularBuffer};
pub use schema::{BufferSchema, ColumnSpec, ColumnType, Row, Value};
pub use window::binary_search_start;

//! Fixed-capacity circular buffer over typed columns.
//!
//! Every column owns `capacity` pre-allocated slots. Inserts write into the
//! slot at `write_position` and advance it modulo the capacity, so once the
//! buffer is full each insert overwrites the logically oldest row.
//!
//! Only [`CircularBuffer::insert`] mutates the buffer and it takes `&mut self`,
//! so a view or aggregate borrowed from the buffer can never be observed
//! across an insert. Callers that need to keep a historical state take a
//! [`CircularBuffer::snapshot`] first.

use super::schema::{BufferSchema, ColumnType, Value};
use super::Row;
use crate::Result;
use chrono::{DateTime, Utc};
use tracing::trace;

/// Slot storage of one column.
#[derive(Debug, Clone)]
pub(crate) enum ColumnSlots {
    Int(Vec<i64>),
    Float(Vec<f64>),
    /// Epoch milliseconds
    Timestamp(Vec<i64>),
    Utf8(Vec<String>),
}

impl ColumnSlots {
    fn allocate(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Int => ColumnSlots::Int(vec![0; capacity]),
            ColumnType::Float => ColumnSlots::Float(vec![0.0; capacity]),
            ColumnType::Timestamp => ColumnSlots::Timestamp(vec![0; capacity]),
            ColumnType::Utf8 => ColumnSlots::Utf8(vec![String::new(); capacity]),
        }
    }

    /// Write a value into a slot. The caller has already type-checked it.
    fn write(&mut self, slot: usize, value: &Value) {
        match (self, value) {
            (ColumnSlots::Int(v), Value::Int(x)) => v[slot] = *x,
            (ColumnSlots::Float(v), Value::Float(x)) => v[slot] = *x,
            (ColumnSlots::Timestamp(v), Value::Timestamp(ts)) => v[slot] = ts.timestamp_millis(),
            (ColumnSlots::Utf8(v), Value::Utf8(s)) => {
                v[slot].clear();
                v[slot].push_str(s);
            }
            _ => unreachable!("row checked against schema before write"),
        }
    }

    /// Read a slot back as a typed value.
    pub(crate) fn read(&self, slot: usize) -> Value {
        match self {
            ColumnSlots::Int(v) => Value::Int(v[slot]),
            ColumnSlots::Float(v) => Value::Float(v[slot]),
            ColumnSlots::Timestamp(v) => Value::Timestamp(
                DateTime::<Utc>::from_timestamp_millis(v[slot]).unwrap_or_default(),
            ),
            ColumnSlots::Utf8(v) => Value::Utf8(v[slot].clone()),
        }
    }

    /// Slot as `f64` for numeric columns.
    pub(crate) fn number(&self, slot: usize) -> Option<f64> {
        match self {
            ColumnSlots::Int(v) => Some(v[slot] as f64),
            ColumnSlots::Float(v) => Some(v[slot]),
            _ => None,
        }
    }

    /// Ordering key of a slot for temporal columns.
    pub(crate) fn time_key(&self, slot: usize) -> Option<i64> {
        match self {
            ColumnSlots::Int(v) | ColumnSlots::Timestamp(v) => Some(v[slot]),
            _ => None,
        }
    }
}

/// Circular windowed buffer.
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    /// Column declarations
    schema: BufferSchema,

    /// Slot storage, parallel to `schema.columns()`
    pub(crate) slots: Vec<ColumnSlots>,

    /// Capacity
    max_size: usize,

    /// Number of valid rows
    current_size: usize,

    /// Next slot to overwrite
    write_position: usize,

    /// Lifetime counters
    counters: Counters,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    inserted: u64,
    evicted: u64,
}

impl CircularBuffer {
    /// Create an empty buffer with `max_size` slots per column.
    ///
    /// A capacity of zero is valid; every insert is then a no-op.
    pub fn new(schema: BufferSchema, max_size: usize) -> Self {
        let slots = schema
            .columns()
            .iter()
            .map(|c| ColumnSlots::allocate(c.column_type, max_size))
            .collect();

        Self {
            schema,
            slots,
            max_size,
            current_size: 0,
            write_position: 0,
            counters: Counters::default(),
        }
    }

    /// Insert a row, evicting the oldest row when full.
    ///
    /// The row must carry exactly the declared columns with matching types;
    /// anything else is a contract violation and leaves the buffer untouched.
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        if self.max_size == 0 {
            return Ok(());
        }

        self.schema.check_row(row)?;

        let slot = self.write_position;
        for (spec, column) in self.schema.columns().iter().zip(self.slots.iter_mut()) {
            if let Some(value) = row.get(&spec.name) {
                column.write(slot, value);
            }
        }

        let evicted = self.current_size == self.max_size;
        if evicted {
            self.counters.evicted += 1;
        }
        self.counters.inserted += 1;

        self.current_size = (self.current_size + 1).min(self.max_size);
        self.write_position = (self.write_position + 1) % self.max_size;

        trace!(slot = slot, evicted = evicted, size = self.current_size, "Row inserted");

        Ok(())
    }

    /// Consuming variant of [`insert`](Self::insert).
    pub fn with_row(mut self, row: &Row) -> Result<Self> {
        self.insert(row)?;
        Ok(self)
    }

    /// Independently owned deep copy of the current state.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Column declarations.
    pub fn schema(&self) -> &BufferSchema {
        &self.schema
    }

    /// Capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of valid rows.
    pub fn len(&self) -> usize {
        self.current_size
    }

    /// Whether the buffer holds no rows.
    pub fn is_empty(&self) -> bool {
        self.current_size == 0
    }

    /// Next slot to overwrite.
    pub fn write_position(&self) -> usize {
        self.write_position
    }

    /// Whether inserts have wrapped around the slot array.
    pub fn has_wrapped(&self) -> bool {
        self.current_size == self.max_size && self.max_size > 0
    }

    /// Storage of a column, or `None` if undeclared.
    pub(crate) fn column_slots(&self, column: &str) -> Option<(ColumnType, &ColumnSlots)> {
        let index = self.schema.index_of(column)?;
        Some((self.schema.columns()[index].column_type, &self.slots[index]))
    }

    /// Buffer statistics.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.max_size,
            current_size: self.current_size,
            write_position: self.write_position,
            total_inserted: self.counters.inserted,
            total_evicted: self.counters.evicted,
        }
    }
}

/// Buffer statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    /// Slots per column
    pub capacity: usize,
    /// Current row count
    pub current_size: usize,
    /// Next slot to overwrite
    pub write_position: usize,
    /// Rows accepted since creation
    pub total_inserted: u64,
    /// Inserts that overwrote a live row
    pub total_evicted: u64,
}

//! Batch drivers built on the circular buffer.
//!
//! - Progressive replay of a sorted batch, one insert at a time
//! - Artifact impact evaluation over clean and perturbed replays

mod impact;
mod replay;

pub use impact::{compare_outputs, measure_impact, ImpactSummary, Perturbation};
pub use replay::{
    replay, rows_to_record_batch, sort_rows_by_timestamp, ProgressiveReplay, ReplayOutput,
};

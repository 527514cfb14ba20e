//! Artifact impact evaluation.
//!
//! Replays a clean batch and a perturbed copy of it through the same
//! aggregate, joins the two result columns on timestamp and reports the mean
//! relative error of the perturbed results.

use super::replay::{sort_rows_by_timestamp, ProgressiveReplay, ReplayOutput};
use crate::aggregate::WindowedAggregate;
use crate::buffer::Row;
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Produces a perturbed copy of a clean batch.
pub trait Perturbation {
    /// Perturb `rows`; the result may be reordered or change length.
    fn perturb(&self, rows: &[Row]) -> Result<Vec<Row>>;
}

impl<F> Perturbation for F
where
    F: Fn(&[Row]) -> Vec<Row>,
{
    fn perturb(&self, rows: &[Row]) -> Result<Vec<Row>> {
        Ok(self(rows))
    }
}

/// How far perturbed results drift from clean ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactSummary {
    /// Aggregate that was compared
    pub aggregate: String,

    /// Mean of `(perturbed - clean) / clean`; `None` without valid pairs
    pub mean_relative_error: Option<f64>,

    /// Number of timestamp-matched pairs that entered the mean
    pub n_valid_pairs: usize,
}

/// Replay clean and perturbed batches and compare their results.
///
/// The perturbed batch is sorted by timestamp before replay.
pub fn measure_impact<P, A>(
    replay: &ProgressiveReplay,
    clean_rows: &[Row],
    perturbation: &P,
    aggregate: &A,
) -> Result<ImpactSummary>
where
    P: Perturbation + ?Sized,
    A: WindowedAggregate + ?Sized,
{
    let mut perturbed_rows = perturbation.perturb(clean_rows)?;
    sort_rows_by_timestamp(&mut perturbed_rows, replay.timestamp_column())?;

    let clean = replay.run(clean_rows, aggregate)?;
    let perturbed = replay.run(&perturbed_rows, aggregate)?;

    let summary = compare_outputs(&clean, &perturbed);
    info!(
        aggregate = %summary.aggregate,
        clean_rows = clean.len(),
        perturbed_rows = perturbed.len(),
        valid_pairs = summary.n_valid_pairs,
        mean_relative_error = ?summary.mean_relative_error,
        "Impact evaluated"
    );

    Ok(summary)
}

/// Join two replay outputs on timestamp and average the relative error.
///
/// A pair counts only when both sides are finite and the clean value is
/// non-zero. When the perturbed output repeats a timestamp, its last result
/// is used.
pub fn compare_outputs(clean: &ReplayOutput, perturbed: &ReplayOutput) -> ImpactSummary {
    let by_timestamp: HashMap<i64, Option<f64>> = perturbed.iter().collect();

    let errors: Vec<f64> = clean
        .iter()
        .filter_map(|(ts, clean_value)| {
            let c = clean_value?;
            let p = (*by_timestamp.get(&ts)?)?;
            (c.is_finite() && p.is_finite() && c != 0.0).then(|| (p - c) / c)
        })
        .collect();

    ImpactSummary {
        aggregate: clean.aggregate.clone(),
        mean_relative_error: crate::aggregate::mean(&errors),
        n_valid_pairs: errors.len(),
    }
}

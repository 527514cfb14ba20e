//! Replay command implementation.

use super::input::{read_rows, rows_with_results};
use anyhow::{Context, Result};
use hrvstream_core::engine::sort_rows_by_timestamp;
use hrvstream_core::{Config, ProgressiveReplay};
use std::path::Path;
use tracing::info;

/// Replay every configured aggregate over a row file.
pub fn run(
    mut config: Config,
    input: &Path,
    output: Option<&Path>,
    capacity: Option<usize>,
    sort: bool,
) -> Result<()> {
    // Apply CLI overrides
    if let Some(c) = capacity {
        config.buffer.capacity = c;
    }
    config.validate()?;

    let replay = ProgressiveReplay::from_config(&config.buffer)?;
    let aggregates = config.build_aggregates()?;

    let mut rows = read_rows(input, replay.schema())?;
    if sort {
        sort_rows_by_timestamp(&mut rows, replay.timestamp_column())?;
    }

    info!(
        input = %input.display(),
        rows = rows.len(),
        capacity = replay.capacity(),
        aggregates = aggregates.len(),
        "Starting replay"
    );

    let outputs = replay.run_all(&rows, &aggregates)?;
    let json = serde_json::to_string_pretty(&rows_with_results(&rows, &outputs))?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write output {}", path.display()))?;
            info!(output = %path.display(), "Replay results written");
        }
        None => println!("{json}"),
    }

    Ok(())
}

//! Evaluate command implementation.

use super::input::read_rows;
use anyhow::Result;
use hrvstream_core::buffer::Row;
use hrvstream_core::engine::{measure_impact, ImpactSummary};
use hrvstream_core::{Config, ProgressiveReplay};
use std::path::Path;
use tracing::info;

/// Compare clean and perturbed row files under every configured aggregate.
pub fn run(config: Config, clean: &Path, perturbed: &Path) -> Result<()> {
    let summaries = evaluate(&config, clean, perturbed)?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

fn evaluate(config: &Config, clean: &Path, perturbed: &Path) -> Result<Vec<ImpactSummary>> {
    let replay = ProgressiveReplay::from_config(&config.buffer)?;
    let aggregates = config.build_aggregates()?;

    let clean_rows = read_rows(clean, replay.schema())?;
    let perturbed_rows = read_rows(perturbed, replay.schema())?;

    info!(
        clean = %clean.display(),
        perturbed = %perturbed.display(),
        clean_rows = clean_rows.len(),
        perturbed_rows = perturbed_rows.len(),
        "Evaluating artifact impact"
    );

    // The perturbed batch was produced offline; hand it back as-is.
    let recorded = |_: &[Row]| perturbed_rows.clone();

    let summaries = aggregates
        .iter()
        .map(|aggregate| measure_impact(&replay, &clean_rows, &recorded, aggregate.as_ref()))
        .collect::<hrvstream_core::Result<Vec<_>>>()?;

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_evaluate_files() {
        let dir = TempDir::new().unwrap();
        let clean = dir.path().join("clean.json");
        let perturbed = dir.path().join("perturbed.json");
        std::fs::write(
            &clean,
            r#"[
                {"timestamp": 1000, "ppi": 800.0},
                {"timestamp": 2000, "ppi": 800.0},
                {"timestamp": 3000, "ppi": 800.0}
            ]"#,
        )
        .unwrap();
        std::fs::write(
            &perturbed,
            r#"[
                {"timestamp": 1000, "ppi": 800.0},
                {"timestamp": 2000, "ppi": 800.0},
                {"timestamp": 3000, "ppi": 1200.0}
            ]"#,
        )
        .unwrap();

        let config = Config::from_toml_str(
            "[[aggregates]]\nname = \"ma2\"\nkind = \"moving_average\"\nwindow_size = 2\n",
        )
        .unwrap();

        let summaries = evaluate(&config, &clean, &perturbed).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].aggregate, "ma2");
        assert_eq!(summaries[0].n_valid_pairs, 2);
        assert!((summaries[0].mean_relative_error.unwrap() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_missing_file() {
        let dir = TempDir::new().unwrap();
        let clean = dir.path().join("clean.json");
        std::fs::write(&clean, "[]").unwrap();

        assert!(evaluate(&Config::default(), &clean, &dir.path().join("missing.json")).is_err());
    }
}

//! Integration tests for hrvstream-core.
//!
//! These exercise the public API end to end: configuration, the circular
//! buffer and its views, the aggregate family, replay and impact evaluation.
//!
//! Run with: cargo test --test integration_tests

use chrono::{DateTime, TimeDelta, Utc};
use hrvstream_core::aggregate::{
    cascaded_median_filter, exponential_moving_average, median_filter, moving_average, rmssd,
    CascadedMedianFilter, CascadedSmoothingFilter, ExponentialMovingAverage, NamedAggregate,
    Rmssd,
};
use hrvstream_core::buffer::{BufferSchema, CircularBuffer, ColumnType, Row, Value};
use hrvstream_core::config::Config;
use hrvstream_core::engine::{measure_impact, rows_to_record_batch, ProgressiveReplay};
use hrvstream_core::{ContractViolation, Error, WindowedAggregate};
use tempfile::TempDir;

fn ppi_schema() -> BufferSchema {
    BufferSchema::new([
        ("timestamp", ColumnType::Timestamp),
        ("ppi", ColumnType::Float),
    ])
    .expect("valid schema")
}

/// Rows whose timestamps accumulate the intervals, starting at `start`.
fn ppi_rows(start: DateTime<Utc>, intervals: &[f64]) -> Vec<Row> {
    let mut t = start;
    intervals
        .iter()
        .map(|&ppi| {
            t += TimeDelta::milliseconds(ppi as i64);
            Row::new().with("timestamp", t).with("ppi", ppi)
        })
        .collect()
}

fn session_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

mod buffer_integration {
    use super::*;

    /// Test buffer under a long stream with repeated wraparound.
    #[test]
    fn test_buffer_long_stream() {
        let mut buffer = CircularBuffer::new(ppi_schema(), 300);
        let intervals: Vec<f64> = (0..1000).map(|i| 800.0 + (i % 7) as f64 * 10.0).collect();

        for row in ppi_rows(session_start(), &intervals) {
            buffer.insert(&row).expect("Failed to insert row");
            assert!(buffer.len() <= buffer.max_size());
        }

        assert_eq!(buffer.len(), 300);
        let stats = buffer.stats();
        assert_eq!(stats.total_inserted, 1000);
        assert_eq!(stats.total_evicted, 700);

        // Chronological view holds the newest 300 rows in order.
        let timestamps = buffer
            .chronological_timestamps("timestamp")
            .expect("timestamps");
        assert_eq!(timestamps.len(), 300);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

        let view = buffer.as_view().expect("view");
        assert_eq!(view.num_rows(), 300);
        assert_eq!(view.num_columns(), 2);
    }

    /// Test time-window queries against the wrapped buffer.
    #[test]
    fn test_buffer_time_window_queries() {
        let mut buffer = CircularBuffer::new(ppi_schema(), 50);
        for row in ppi_rows(session_start(), &[1000.0; 120]) {
            buffer.insert(&row).unwrap();
        }

        let last_10s = buffer
            .time_window_view("timestamp", Some(TimeDelta::seconds(10)))
            .unwrap();
        assert_eq!(last_10s.num_rows(), 11);

        let beyond_capacity = buffer
            .time_window_view("timestamp", Some(TimeDelta::hours(1)))
            .unwrap();
        assert_eq!(beyond_capacity.num_rows(), 50);

        let latest = buffer
            .time_window_view("timestamp", Some(TimeDelta::zero()))
            .unwrap();
        assert_eq!(latest.num_rows(), 1);
    }

    /// Test that views outlive further inserts unchanged.
    #[test]
    fn test_view_is_detached_from_buffer() {
        let mut buffer = CircularBuffer::new(ppi_schema(), 3);
        for row in ppi_rows(session_start(), &[800.0, 810.0, 820.0]) {
            buffer.insert(&row).unwrap();
        }
        let view = buffer.as_view().unwrap();
        let snapshot = buffer.snapshot();

        for row in ppi_rows(session_start() + TimeDelta::hours(1), &[900.0, 910.0]) {
            buffer.insert(&row).unwrap();
        }

        assert_eq!(view.num_rows(), 3);
        assert_eq!(moving_average(&snapshot, 3, "ppi").unwrap(), Some(810.0));
        let current = moving_average(&buffer, 3, "ppi").unwrap().unwrap();
        assert!((current - 2630.0 / 3.0).abs() < 1e-9);
    }

    /// Test contract violations surface at the call that made them.
    #[test]
    fn test_buffer_contract_violations() {
        let mut buffer = CircularBuffer::new(ppi_schema(), 3);

        let missing = Row::new().with("timestamp", Value::timestamp_millis(0).unwrap());
        assert!(matches!(
            buffer.insert(&missing),
            Err(Error::Contract(ContractViolation::MissingField { .. }))
        ));

        let wrong_type = Row::new()
            .with("timestamp", Value::timestamp_millis(0).unwrap())
            .with("ppi", "fast");
        assert!(matches!(
            buffer.insert(&wrong_type),
            Err(Error::Contract(ContractViolation::TypeMismatch { .. }))
        ));

        assert!(buffer.is_empty());
        assert!(buffer
            .time_window_view("ts", Some(TimeDelta::seconds(1)))
            .is_err());
    }
}

mod aggregate_integration {
    use super::*;

    /// Test the aggregate family on one realistic buffer.
    #[test]
    fn test_aggregates_on_shared_buffer() {
        let mut buffer = CircularBuffer::new(ppi_schema(), 300);
        for row in ppi_rows(session_start(), &[800.0, 850.0, 820.0, 880.0, 810.0]) {
            buffer.insert(&row).unwrap();
        }

        let value = rmssd(&buffer, "timestamp", Some(TimeDelta::seconds(30)), "ppi")
            .unwrap()
            .unwrap();
        assert!((value - 54.543_560_573_1).abs() < 1e-6);

        assert_eq!(moving_average(&buffer, 5, "ppi").unwrap(), Some(832.0));
        assert_eq!(median_filter(&buffer, 4, "ppi").unwrap(), Some(850.0));
        assert!(cascaded_median_filter(&buffer, "ppi").unwrap().is_some());
        assert_eq!(
            exponential_moving_average(&buffer, 1.0, "ppi").unwrap(),
            Some(810.0)
        );
    }

    /// Test a user-defined aggregate plugs in without touching the buffer.
    #[test]
    fn test_custom_aggregate() {
        let range = NamedAggregate::new("ppi_range", |buffer: &CircularBuffer| {
            let view = buffer.as_view()?;
            let values = hrvstream_core::aggregate::numeric_values(&view, "ppi")?;
            if values.is_empty() {
                return Ok(None);
            }
            let max = values.iter().copied().fold(f64::MIN, f64::max);
            let min = values.iter().copied().fold(f64::MAX, f64::min);
            Ok(Some(max - min))
        });

        let rows = ppi_rows(session_start(), &[800.0, 850.0, 820.0]);
        let replay = ProgressiveReplay::new(ppi_schema(), 10, "timestamp").unwrap();
        let output = replay.run(&rows, &range).unwrap();

        assert_eq!(output.aggregate, "ppi_range");
        assert_eq!(output.values, vec![Some(0.0), Some(50.0), Some(50.0)]);
    }
}

mod replay_integration {
    use super::*;

    /// Test replay against a recomputation from scratch at every row.
    #[test]
    fn test_replay_equals_independent_recomputation() {
        let intervals: Vec<f64> = (0..60)
            .map(|i| 780.0 + ((i * 37) % 90) as f64)
            .collect();
        let rows = ppi_rows(session_start(), &intervals);
        let aggregate = Rmssd::new("timestamp", Some(TimeDelta::seconds(10)));

        let replay = ProgressiveReplay::new(ppi_schema(), 20, "timestamp").unwrap();
        let output = replay.run(&rows, &aggregate).unwrap();
        assert_eq!(output.len(), rows.len());

        for i in 0..rows.len() {
            let mut fresh = CircularBuffer::new(ppi_schema(), 20);
            for row in &rows[..=i] {
                fresh.insert(row).unwrap();
            }
            assert_eq!(output.values[i], aggregate.evaluate(&fresh).unwrap());
        }
    }

    /// Test the smoothing family replays like a fresh buffer, across wraparound.
    #[test]
    fn test_smoothing_replay_equals_independent_recomputation() {
        let intervals: Vec<f64> = (0..40)
            .map(|i| 760.0 + ((i * 53) % 110) as f64)
            .collect();
        let rows = ppi_rows(session_start(), &intervals);
        let capacity = 12;
        let aggregates: Vec<Box<dyn WindowedAggregate>> = vec![
            Box::new(CascadedMedianFilter::new("ppi")),
            Box::new(ExponentialMovingAverage::new("ppi", 0.3)),
            Box::new(CascadedSmoothingFilter::new("ppi", 3, 4)),
        ];

        let replay = ProgressiveReplay::new(ppi_schema(), capacity, "timestamp").unwrap();
        let outputs = replay.run_all(&rows, &aggregates).unwrap();
        assert!(rows.len() > capacity);

        for (aggregate, output) in aggregates.iter().zip(&outputs) {
            assert_eq!(output.len(), rows.len());
            assert!(output.valid_count() > 0);
            for i in 0..rows.len() {
                let mut fresh = CircularBuffer::new(ppi_schema(), capacity);
                for row in &rows[..=i] {
                    fresh.insert(row).unwrap();
                }
                assert_eq!(
                    output.values[i],
                    aggregate.evaluate(&fresh).unwrap(),
                    "{} at row {}",
                    output.aggregate,
                    i
                );
            }
        }
    }

    /// Test replay results can be attached back to the batch.
    #[test]
    fn test_replay_result_column() {
        let rows = ppi_rows(session_start(), &[800.0, 850.0, 820.0, 880.0]);
        let config = Config::default();
        let replay = ProgressiveReplay::from_config(&config.buffer).unwrap();
        let aggregates = config.build_aggregates().unwrap();

        let outputs = replay.run_all(&rows, &aggregates).unwrap();
        let batch = rows_to_record_batch(replay.schema(), &rows).unwrap();
        let merged = outputs[0].append_to(&batch, &outputs[0].aggregate).unwrap();

        assert_eq!(merged.num_rows(), 4);
        assert!(merged.column_by_name("rmssd_30s").is_some());
        assert_eq!(outputs[0].valid_count(), 3);
    }
}

mod evaluation_integration {
    use super::*;

    /// Test a missed-beat artifact raises RMSSD error.
    #[test]
    fn test_missed_beat_artifact() {
        let intervals: Vec<f64> = (0..40).map(|i| 800.0 + (i % 4) as f64 * 15.0).collect();
        let rows = ppi_rows(session_start(), &intervals);

        // Merge rows 20 and 21 into one long interval.
        let missed_beat = |rows: &[Row]| {
            let mut out = rows.to_vec();
            let merged = out[20]
                .get("ppi")
                .and_then(Value::as_f64)
                .unwrap_or_default()
                + out[21].get("ppi").and_then(Value::as_f64).unwrap_or_default();
            out[21].set("ppi", merged);
            out.remove(20);
            out
        };

        let replay = ProgressiveReplay::new(ppi_schema(), 30, "timestamp").unwrap();
        let aggregate = Rmssd::new("timestamp", Some(TimeDelta::seconds(15)));
        let summary = measure_impact(&replay, &rows, &missed_beat, &aggregate).unwrap();

        assert_eq!(summary.n_valid_pairs, 38);
        assert!(summary.mean_relative_error.unwrap() > 0.0);
    }
}

mod config_integration {
    use super::*;

    /// Test a configuration file drives the full pipeline.
    #[test]
    fn test_config_file_pipeline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hrvstream.toml");
        std::fs::write(
            &path,
            r#"
[buffer]
capacity = 8

[[aggregates]]
name = "ma3"
kind = "moving_average"
window_size = 3

[[aggregates]]
name = "ema"
kind = "exponential_moving_average"
alpha = 0.5
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        let replay = ProgressiveReplay::from_config(&config.buffer).unwrap();
        let aggregates = config.build_aggregates().unwrap();
        let rows = ppi_rows(session_start(), &[800.0, 820.0, 840.0]);

        let outputs = replay.run_all(&rows, &aggregates).unwrap();
        assert_eq!(outputs[0].values, vec![None, None, Some(820.0)]);
        assert_eq!(
            outputs[1].values,
            vec![Some(800.0), Some(810.0), Some(825.0)]
        );
    }

    /// Test invalid configuration is rejected with a config error.
    #[test]
    fn test_invalid_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "[[aggregates]]\nname = \"ema\"\nkind = \"exponential_moving_average\"\nalpha = 2.0\n",
        )
        .unwrap();

        assert!(matches!(Config::from_file(&path), Err(Error::Config(_))));
    }
}

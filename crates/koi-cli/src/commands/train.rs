//! Train command implementation

use super::read_table;
use crate::error::Result;
use crate::output;
use koi_classifier::metrics::ClassificationReport;
use koi_classifier::training::{train, TrainingConfig};
use serde::Serialize;
use std::path::Path;

/// Training result for JSON output
#[derive(Serialize)]
struct TrainResult<'a> {
    artifacts: String,
    features: &'a [String],
    n_train: usize,
    n_test: usize,
    report: &'a ClassificationReport,
}

pub(crate) fn run(
    data: &Path,
    out: &Path,
    config: Option<&Path>,
    seed: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(seed) = seed {
        config = config.with_random_state(seed);
    }

    let table = read_table(data)?;
    let outcome = train(&table, &config)?;
    outcome.bundle.save(out)?;

    if json {
        return output::json(&TrainResult {
            artifacts: out.display().to_string(),
            features: outcome.bundle.schema().columns(),
            n_train: outcome.n_train,
            n_test: outcome.n_test,
            report: &outcome.report,
        });
    }

    output::section("Training");
    output::kv("Data", data.display());
    output::kv("Features", outcome.bundle.schema().len());
    output::kv("Train rows", outcome.n_train);
    output::kv("Test rows", outcome.n_test);
    output::kv("Seed", config.random_state);

    output::section("Held-out evaluation");
    println!("{}", outcome.report);

    output::success(&format!("artifacts written to {}", out.display()));
    Ok(())
}

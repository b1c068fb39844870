//! Inspect command implementation
//!
//! Shows the schema, fitted preprocessing statistics and ensemble layout of
//! an artifact directory.

use super::load_service;
use crate::error::Result;
use crate::output;
use std::path::Path;

pub(crate) fn run(artifacts: &Path, json: bool) -> Result<()> {
    let service = load_service(artifacts)?;
    let summary = service.bundle().summary();

    if json {
        return output::json(&summary);
    }

    output::section("Artifacts");
    output::kv("Directory", artifacts.display());
    output::kv("Features", summary.n_features);
    output::kv("Base learners", summary.estimators.join(", "));
    output::kv("Stacking folds", summary.cv);
    output::kv("Meta-learner iterations", summary.meta_iterations);

    output::section("Feature statistics");
    let width = summary
        .features
        .iter()
        .map(|f| f.name.len())
        .max()
        .unwrap_or(0);
    println!(
        "  {:<width$}  {:>14} {:>14} {:>14}",
        "FEATURE", "MEDIAN", "MEAN", "STD"
    );
    for f in &summary.features {
        println!(
            "  {:<width$}  {:>14.6} {:>14.6} {:>14.6}",
            f.name, f.median, f.mean, f.std
        );
    }
    Ok(())
}

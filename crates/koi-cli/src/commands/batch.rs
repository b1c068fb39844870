//! Batch command implementation

use super::{load_service, read_table};
use crate::error::Result;
use crate::output;
use colored::Colorize;
use koi_classifier::inference::RowStatus;
use std::path::Path;

pub(crate) fn run(artifacts: &Path, input: &Path, out: Option<&Path>, json: bool) -> Result<()> {
    let service = load_service(artifacts)?;
    let table = read_table(input)?;
    let report = service.predict_batch(&table)?;

    if let Some(out) = out {
        std::fs::write(out, serde_json::to_string_pretty(&report)?)?;
    }
    if json {
        return output::json(&report);
    }

    output::section("Batch predictions");
    let id_width = report
        .results
        .iter()
        .map(|r| r.id.len())
        .max()
        .unwrap_or(0)
        .max(2);
    println!(
        "  {:<id_width$}  {:<16} {:>10}  STATUS",
        "ID", "PREDICTION", "CONFIDENCE"
    );
    for row in &report.results {
        let status = match row.status {
            RowStatus::Success => "success".green().to_string(),
            RowStatus::Error => format!(
                "{} {}",
                "error".red(),
                row.error.as_deref().unwrap_or_default()
            ),
        };
        println!(
            "  {:<id_width$}  {:<16} {:>10}  {status}",
            row.id, row.prediction, row.confidence
        );
    }

    output::section("Summary");
    output::kv("Processed", report.total_processed);
    output::kv("Successful", report.successful);
    if report.failed() > 0 {
        output::warning(&format!("{} row(s) could not be scored", report.failed()));
    }
    if let Some(out) = out {
        output::success(&format!("results written to {}", out.display()));
    }
    Ok(())
}

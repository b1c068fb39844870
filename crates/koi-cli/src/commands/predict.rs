//! Predict command implementation

use super::{load_service, read_record};
use crate::error::Result;
use crate::output;
use koi_classifier::disposition::DISPOSITIONS;
use std::path::Path;

pub(crate) fn run(artifacts: &Path, record: &str, json: bool) -> Result<()> {
    let service = load_service(artifacts)?;
    let record = read_record(record)?;
    let prediction = service.predict_one(&record)?;

    if json {
        return output::json(&prediction);
    }

    output::section("Prediction");
    output::kv(
        "Disposition",
        output::disposition(prediction.disposition.as_str()),
    );
    output::kv("Confidence", prediction.confidence);
    for (label, p) in DISPOSITIONS.iter().zip(prediction.probabilities) {
        output::kv(&format!("  P({label})"), format!("{p:.4}"));
    }
    Ok(())
}

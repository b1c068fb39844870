//! Explain command implementation
//!
//! Classifies a record and prints the prompt an external text generator
//! would receive for the user's question.

use super::{load_service, read_record};
use crate::error::Result;
use crate::output;
use koi_classifier::inference::{ExplanationContext, Prediction};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ExplainResult<'a> {
    #[serde(flatten)]
    prediction: &'a Prediction,
    prompt: String,
}

pub(crate) fn run(artifacts: &Path, record: &str, question: &str, json: bool) -> Result<()> {
    let service = load_service(artifacts)?;
    let record = read_record(record)?;
    let prediction = service.predict_one(&record)?;
    let prompt = ExplanationContext::new(&record, &prediction).render_prompt(question)?;

    if json {
        return output::json(&ExplainResult {
            prediction: &prediction,
            prompt,
        });
    }

    output::section("Prediction");
    output::kv(
        "Disposition",
        output::disposition(prediction.disposition.as_str()),
    );
    output::kv("Confidence", prediction.confidence);
    output::section("Prompt");
    println!("{prompt}");
    Ok(())
}

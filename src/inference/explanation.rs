//! Context handed to an external text generator that explains a prediction.

use super::Prediction;
use crate::data::RawRecord;
use crate::error::{KoiError, Result};
use serde::{Deserialize, Serialize};

/// A record together with the prediction it received.
///
/// Serializes with the same field names an explanation request carries, so
/// a client can echo back what it got from `/predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationContext {
    /// The fields submitted for classification
    pub input_data: RawRecord,
    /// Disposition label
    pub prediction: String,
    /// Confidence string, e.g. `"87.42%"`
    pub confidence: String,
}

impl ExplanationContext {
    /// Captures a record and its prediction.
    #[must_use]
    pub fn new(record: &RawRecord, prediction: &Prediction) -> Self {
        Self {
            input_data: record.clone(),
            prediction: prediction.disposition.to_string(),
            confidence: prediction.confidence.to_string(),
        }
    }

    /// Renders the astronomer-persona prompt for `question`.
    ///
    /// # Errors
    ///
    /// `KoiError::Validation` if the question is blank or the context has
    /// no input data or prediction.
    pub fn render_prompt(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(KoiError::Validation("question is empty".to_string()));
        }
        if self.input_data.is_empty() || self.prediction.trim().is_empty() {
            return Err(KoiError::Validation(
                "explanation context is incomplete".to_string(),
            ));
        }
        let input_data = serde_json::to_string(&self.input_data)?;

        Ok(format!(
            "You are Exo-Chat, a friendly and brilliant NASA astronomer and science \
             communicator. Your goal is to explain complex exoplanet data in an exciting \
             and easy-to-understand way. A user has just received a classification for a \
             Kepler Object of Interest and has questions.\n\
             \n\
             HERE IS THE DATA CONTEXT:\n\
             - Input Data: {input_data}\n\
             - Model Prediction: The object is classified as a \"{prediction}\" with \
             {confidence} confidence.\n\
             \n\
             Based on this context, answer the user's question clearly and \
             enthusiastically. If they ask about a specific value, explain what it means \
             (e.g., 'koi_period' is how long it takes to orbit its star). Never break \
             character. Be encouraging and spark curiosity about space exploration.\n\
             \n\
             USER'S QUESTION: \"{question}\"",
            prediction = self.prediction,
            confidence = self.confidence,
        ))
    }
}

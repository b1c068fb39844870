//! Subcommand implementations and shared input handling.

pub(crate) mod batch;
pub(crate) mod explain;
pub(crate) mod inspect;
pub(crate) mod predict;
pub(crate) mod train;

use crate::error::{require_exists, CliError, Result};
use koi_classifier::data::{RawRecord, RawTable};
use koi_classifier::inference::InferenceService;
use std::path::Path;

/// Reads a record given inline as JSON or as `@path` to a JSON file.
pub(crate) fn read_record(arg: &str) -> Result<RawRecord> {
    let text = match arg.strip_prefix('@') {
        Some(path) => {
            let path = Path::new(path);
            require_exists(path)?;
            std::fs::read_to_string(path)?
        }
        None => arg.to_string(),
    };
    serde_json::from_str(&text)
        .map_err(|e| CliError::InvalidInput(format!("record must be a JSON object: {e}")))
}

/// Reads a table from CSV, or from a JSON array of objects when the file
/// extension is `.json`.
pub(crate) fn read_table(path: &Path) -> Result<RawTable> {
    require_exists(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let table = if is_json {
        RawTable::from_json_str(&std::fs::read_to_string(path)?)?
    } else {
        RawTable::from_csv_path(path)?
    };
    Ok(table)
}

/// Loads the inference service from an artifact directory.
pub(crate) fn load_service(artifacts: &Path) -> Result<InferenceService> {
    require_exists(artifacts)?;
    Ok(InferenceService::from_dir(artifacts)?)
}

//! `SafeTensors` reader and writer for F32 statistics vectors.
//!
//! Only the F32 dtype is written or accepted. Errors are plain strings; the
//! artifact layer attaches the file name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Metadata for a single tensor in `SafeTensors` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMetadata {
    /// Data type of the tensor (always "F32" here).
    pub dtype: String,
    /// Shape of the tensor (e.g., `[n_features]`).
    pub shape: Vec<usize>,
    /// Data offsets `[start, end]` in the raw data section.
    pub data_offsets: [usize; 2],
}

/// Tensor entries keyed by name.
/// `BTreeMap` keeps the JSON header deterministic.
pub type SafeTensorsMetadata = BTreeMap<String, TensorMetadata>;

/// Free-form string metadata stored under `__metadata__`.
pub type UserMetadata = BTreeMap<String, String>;

/// Saves tensors to `SafeTensors` format.
///
/// # Arguments
///
/// * `path` - File path to write to
/// * `tensors` - Map of tensor names to (data, shape) tuples
/// * `user_metadata` - Written under `__metadata__` when non-empty
///
/// # Errors
///
/// Returns an error if a shape disagrees with its data length or writing fails.
pub fn save_safetensors<P: AsRef<Path>>(
    path: P,
    tensors: &BTreeMap<String, (Vec<f32>, Vec<usize>)>,
    user_metadata: &UserMetadata,
) -> Result<(), String> {
    let mut header = serde_json::Map::new();
    if !user_metadata.is_empty() {
        let meta = user_metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        header.insert("__metadata__".to_string(), serde_json::Value::Object(meta));
    }

    let mut raw_data = Vec::new();
    for (name, (data, shape)) in tensors {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(format!(
                "Tensor '{name}' has {} values but shape {shape:?}",
                data.len()
            ));
        }

        let start = raw_data.len();
        for &value in data {
            raw_data.extend_from_slice(&value.to_le_bytes());
        }
        let meta = TensorMetadata {
            dtype: "F32".to_string(),
            shape: shape.clone(),
            data_offsets: [start, raw_data.len()],
        };
        let value =
            serde_json::to_value(meta).map_err(|e| format!("JSON serialization failed: {e}"))?;
        header.insert(name.clone(), value);
    }

    let metadata_json = serde_json::to_string(&serde_json::Value::Object(header))
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    let metadata_bytes = metadata_json.as_bytes();

    let mut output = Vec::with_capacity(8 + metadata_bytes.len() + raw_data.len());
    output.extend_from_slice(&(metadata_bytes.len() as u64).to_le_bytes());
    output.extend_from_slice(metadata_bytes);
    output.extend_from_slice(&raw_data);

    fs::write(path, output).map_err(|e| format!("File write failed: {e}"))
}

/// A fully read `SafeTensors` file.
#[derive(Debug, Clone)]
pub struct SafeTensorsFile {
    metadata: SafeTensorsMetadata,
    user_metadata: UserMetadata,
    raw_data: Vec<u8>,
}

impl SafeTensorsFile {
    /// Reads and validates a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its header is invalid.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let bytes = fs::read(path).map_err(|e| format!("File read failed: {e}"))?;
        Self::from_bytes(&bytes)
    }

    /// Parses an in-memory file.
    ///
    /// # Errors
    ///
    /// Returns an error on a truncated header, malformed JSON or a tensor
    /// whose offsets fall outside the data section.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let metadata_len = validate_and_read_header(bytes)?;
        let (metadata, user_metadata) = parse_metadata(&bytes[8..8 + metadata_len])?;
        let raw_data = bytes[8 + metadata_len..].to_vec();

        for (name, meta) in &metadata {
            let [start, end] = meta.data_offsets;
            if start > end || end > raw_data.len() {
                return Err(format!(
                    "Tensor '{name}' offsets [{start}, {end}] exceed data size {}",
                    raw_data.len()
                ));
            }
        }

        Ok(Self {
            metadata,
            user_metadata,
            raw_data,
        })
    }

    /// Tensor names in sorted order.
    #[must_use]
    pub fn tensor_names(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    /// Value stored under `__metadata__`, if any.
    #[must_use]
    pub fn user_metadata(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).map(String::as_str)
    }

    /// Extracts a tensor as F32 values.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is absent, not F32, or its byte length
    /// disagrees with its shape.
    pub fn get_tensor(&self, name: &str) -> Result<Vec<f32>, String> {
        let meta = self
            .metadata
            .get(name)
            .ok_or_else(|| format!("Missing '{name}' tensor"))?;
        if meta.dtype != "F32" {
            return Err(format!("Unsupported dtype {} for '{name}'", meta.dtype));
        }

        let [start, end] = meta.data_offsets;
        let values = extract_f32(&self.raw_data[start..end])?;

        let expected: usize = meta.shape.iter().product();
        if values.len() != expected {
            return Err(format!(
                "Tensor '{name}' holds {} values but shape is {:?}",
                values.len(),
                meta.shape
            ));
        }
        Ok(values)
    }
}

fn validate_and_read_header(bytes: &[u8]) -> Result<usize, String> {
    let Some(header_bytes) = bytes.get(0..8) else {
        return Err(format!(
            "Invalid SafeTensors file: file is {} bytes, need at least 8 bytes for header",
            bytes.len()
        ));
    };
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(header_bytes);
    let metadata_len = u64::from_le_bytes(len_bytes) as usize;

    if metadata_len == 0 {
        return Err("Invalid SafeTensors file: metadata length is 0".to_string());
    }
    if metadata_len > bytes.len() - 8 {
        return Err(format!(
            "Invalid SafeTensors file: metadata length {metadata_len} exceeds file size"
        ));
    }
    Ok(metadata_len)
}

fn parse_metadata(json: &[u8]) -> Result<(SafeTensorsMetadata, UserMetadata), String> {
    let text =
        std::str::from_utf8(json).map_err(|e| format!("Metadata is not valid UTF-8: {e}"))?;
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("JSON parsing failed: {e}"))?;
    let serde_json::Value::Object(map) = value else {
        return Err("Metadata header is not a JSON object".to_string());
    };

    let mut metadata = SafeTensorsMetadata::new();
    let mut user_metadata = UserMetadata::new();
    for (key, value) in map {
        if key == "__metadata__" {
            if let serde_json::Value::Object(entries) = value {
                for (k, v) in entries {
                    if let serde_json::Value::String(s) = v {
                        user_metadata.insert(k, s);
                    }
                }
            }
            continue;
        }
        let meta: TensorMetadata = serde_json::from_value(value)
            .map_err(|e| format!("Invalid metadata for tensor '{key}': {e}"))?;
        metadata.insert(key, meta);
    }
    Ok((metadata, user_metadata))
}

fn extract_f32(tensor_bytes: &[u8]) -> Result<Vec<f32>, String> {
    if tensor_bytes.len() % 4 != 0 {
        return Err(format!(
            "Invalid F32 tensor data: size {} is not a multiple of 4 bytes",
            tensor_bytes.len()
        ));
    }
    Ok(tensor_bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

//! Statistics serialization.
//!
//! Fitted imputer and scaler statistics are stored as `SafeTensors`:
//! ```text
//! [8-byte header: u64 metadata length (little-endian)]
//! [JSON metadata: tensor names, dtypes, shapes, data_offsets, __metadata__]
//! [Raw tensor data: F32 values in little-endian]
//! ```
//!
//! Example:
//! ```rust
//! use koi_classifier::serialization::safetensors::{self, SafeTensorsFile};
//! use std::collections::BTreeMap;
//!
//! let dir = std::env::temp_dir().join("koi_doc_safetensors");
//! std::fs::create_dir_all(&dir).unwrap();
//! let path = dir.join("stats.safetensors");
//!
//! let mut tensors = BTreeMap::new();
//! tensors.insert("median".to_string(), (vec![1.0, 2.5], vec![2]));
//! safetensors::save_safetensors(&path, &tensors, &BTreeMap::new()).unwrap();
//!
//! let file = SafeTensorsFile::open(&path).unwrap();
//! assert_eq!(file.get_tensor("median").unwrap(), vec![1.0, 2.5]);
//! # std::fs::remove_dir_all(&dir).ok();
//! ```

pub mod safetensors;

pub use safetensors::{SafeTensorsFile, SafeTensorsMetadata, UserMetadata};

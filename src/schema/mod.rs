//! Feature schema: the authoritative, ordered list of model inputs.
//!
//! Inputs carry named fields in arbitrary order and often with extra columns.
//! The schema decides which fields reach the model and in what order.
//!
//! # Example
//!
//! ```
//! use koi_classifier::data::{RawRecord, RawValue};
//! use koi_classifier::schema::FeatureSchema;
//!
//! let schema = FeatureSchema::new(vec!["koi_period".into(), "koi_depth".into()])
//!     .expect("valid schema");
//!
//! let mut record = RawRecord::new();
//! record.insert("koi_depth".into(), RawValue::Number(615.8));
//! record.insert("koi_period".into(), RawValue::Number(9.49));
//! record.insert("notes".into(), RawValue::Text("ignored".into()));
//!
//! let ordered = schema.validate_and_order(&record).expect("all present");
//! assert_eq!(ordered, vec![&RawValue::Number(9.49), &RawValue::Number(615.8)]);
//! ```

use crate::data::{RawRecord, RawTable, RawValue};
use crate::error::{KoiError, Result, RowFailure};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Raw values of one record in schema order.
pub type OrderedRecord<'a> = Vec<&'a RawValue>;

/// Position of each schema column within a table header.
pub type ColumnIndex = Vec<usize>;

/// Ordered, duplicate-free feature names.
///
/// Serializes as a bare JSON array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Creates a schema.
    ///
    /// # Errors
    ///
    /// Returns `KoiError::Validation` for an empty list, an empty name or a
    /// duplicate name.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(KoiError::empty_input("feature schema has no columns"));
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if name.is_empty() {
                return Err(KoiError::Validation(
                    "feature names cannot be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(KoiError::Validation(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Feature names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false for a constructed schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Checks that every schema column is present and returns the record's
    /// values in schema order. Extra fields are dropped.
    ///
    /// # Errors
    ///
    /// `KoiError::SchemaMismatch` naming every absent column, in schema order.
    pub fn validate_and_order<'a>(&self, record: &'a RawRecord) -> Result<OrderedRecord<'a>> {
        let mut ordered = Vec::with_capacity(self.columns.len());
        let mut missing = Vec::new();
        for name in &self.columns {
            match record.get(name) {
                Some(value) => ordered.push(value),
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(ordered)
        } else {
            Err(KoiError::SchemaMismatch {
                missing_columns: missing,
            })
        }
    }

    /// Header-level check for a whole table.
    ///
    /// # Errors
    ///
    /// `KoiError::SchemaMismatch` naming every column absent from the header.
    pub fn validate_table(&self, table: &RawTable) -> Result<ColumnIndex> {
        let mut index = Vec::with_capacity(self.columns.len());
        let mut missing = Vec::new();
        for name in &self.columns {
            match table.column_index(name) {
                Some(col) => index.push(col),
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(index)
        } else {
            Err(KoiError::SchemaMismatch {
                missing_columns: missing,
            })
        }
    }

    /// Converts ordered raw values into features, `None` marking a missing value.
    ///
    /// # Errors
    ///
    /// The first cell that cannot be read as a number.
    pub fn parse_values<'a, I>(&self, values: I) -> std::result::Result<Vec<Option<f32>>, RowFailure>
    where
        I: IntoIterator<Item = &'a RawValue>,
    {
        values
            .into_iter()
            .zip(&self.columns)
            .map(|(value, name)| value.to_feature(name))
            .collect()
    }

    /// Writes the schema as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a schema written by [`FeatureSchema::save_json`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or not a valid schema.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = KoiError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            "koi_period".to_string(),
            "koi_depth".to_string(),
            "koi_prad".to_string(),
        ])
        .expect("schema")
    }

    fn record(pairs: &[(&str, f64)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), RawValue::Number(*v)))
            .collect()
    }

    #[test]
    fn test_orders_by_schema_and_drops_extras() {
        let rec = record(&[
            ("koi_prad", 2.0),
            ("extra", 99.0),
            ("koi_period", 9.0),
            ("koi_depth", 600.0),
        ]);
        let ordered = schema().validate_and_order(&rec).expect("valid");
        let values: Vec<f64> = ordered
            .iter()
            .map(|v| match v {
                RawValue::Number(n) => *n,
                _ => f64::NAN,
            })
            .collect();
        assert_eq!(values, vec![9.0, 600.0, 2.0]);
    }

    #[test]
    fn test_reports_every_missing_column_in_schema_order() {
        let rec = record(&[("koi_depth", 600.0)]);
        let err = schema().validate_and_order(&rec).unwrap_err();
        assert_eq!(
            err.missing_columns(),
            Some(&["koi_period".to_string(), "koi_prad".to_string()][..])
        );
    }

    #[test]
    fn test_null_counts_as_present() {
        let mut rec = record(&[("koi_period", 1.0), ("koi_depth", 2.0)]);
        rec.insert("koi_prad".to_string(), RawValue::Null);
        let ordered = schema().validate_and_order(&rec).expect("present");
        let features = schema().parse_values(ordered).expect("numeric");
        assert_eq!(features, vec![Some(1.0), Some(2.0), None]);
    }

    #[test]
    fn test_validate_table_index() {
        let table = RawTable::new(
            vec!["koi_prad".into(), "id".into(), "koi_period".into(), "koi_depth".into()],
            Vec::new(),
        )
        .expect("table");
        assert_eq!(schema().validate_table(&table).expect("index"), vec![2, 3, 0]);

        let partial = RawTable::new(vec!["koi_depth".into()], Vec::new()).expect("table");
        let err = schema().validate_table(&partial).unwrap_err();
        assert_eq!(err.missing_columns().map(<[String]>::len), Some(2));
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(FeatureSchema::new(vec!["a".into(), "a".into()]).is_err());
        assert!(FeatureSchema::new(vec![String::new()]).is_err());
        assert!(FeatureSchema::new(Vec::new()).is_err());
    }

    #[test]
    fn test_json_is_plain_array() {
        let json = serde_json::to_string(&schema()).expect("json");
        assert_eq!(json, r#"["koi_period","koi_depth","koi_prad"]"#);
        let bad: std::result::Result<FeatureSchema, _> = serde_json::from_str(r#"["a","a"]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_save_load_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model_columns.json");
        schema().save_json(&path).expect("save");
        assert_eq!(FeatureSchema::load_json(&path).expect("load"), schema());
    }
}

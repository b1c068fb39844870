//! Raw tabular input for training and inference.
//!
//! Cells stay untyped (`RawValue`) until a row is scored, so one malformed
//! cell only affects the row that holds it. Heavy data wrangling is out of
//! scope; this is the minimum needed to read a KOI export or a JSON upload.

use crate::error::{KoiError, Result, RowFailure};
use crate::primitives::Matrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// A single untyped cell.
///
/// Deserializes from any JSON scalar; arrays and objects land in `Other` so
/// they fail the row that holds them rather than the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Explicit null / empty cell
    Null,
    /// JSON boolean
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// Text, including numbers read from CSV
    Text(String),
    /// Any other JSON value
    Other(serde_json::Value),
}

impl RawValue {
    /// Interprets the cell as a feature value.
    ///
    /// Null, empty text and `NaN` are missing (`None`) and will be imputed.
    ///
    /// # Errors
    ///
    /// `RowFailure::ValueParse` for unparsable or infinite values, including
    /// finite values too large for `f32`,
    /// `RowFailure::TypeMismatch` for booleans, arrays and objects.
    ///
    /// # Examples
    ///
    /// ```
    /// use koi_classifier::data::RawValue;
    ///
    /// assert_eq!(RawValue::Text("3.5".into()).to_feature("x").unwrap(), Some(3.5));
    /// assert_eq!(RawValue::Text("".into()).to_feature("x").unwrap(), None);
    /// assert!(RawValue::Text("abc".into()).to_feature("x").is_err());
    /// ```
    pub fn to_feature(&self, column: &str) -> std::result::Result<Option<f32>, RowFailure> {
        match self {
            Self::Null => Ok(None),
            Self::Number(n) if n.is_nan() => Ok(None),
            Self::Number(n) if n.is_finite() => narrow(column, *n, || n.to_string()).map(Some),
            Self::Number(n) => Err(RowFailure::ValueParse {
                column: column.to_string(),
                value: n.to_string(),
            }),
            Self::Text(s) => parse_text_feature(column, s),
            Self::Bool(_) => Err(RowFailure::TypeMismatch {
                column: column.to_string(),
                found: "boolean".to_string(),
            }),
            Self::Other(v) => Err(RowFailure::TypeMismatch {
                column: column.to_string(),
                found: json_kind(v).to_string(),
            }),
        }
    }

    /// True when the cell would be imputed.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Number(n) => n.is_nan(),
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell as a row identifier.
    ///
    /// Whole numbers drop the fractional part so `7.0` reads as `7`.
    #[must_use]
    pub fn as_id(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::Other(v) => v.to_string(),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Option<f64>> for RawValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

fn csv_cell(bytes: &[u8]) -> RawValue {
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        RawValue::Null
    } else {
        RawValue::Text(text.into_owned())
    }
}

/// Narrows a finite value to `f32`, rejecting magnitudes `f32` cannot hold.
fn narrow(
    column: &str,
    value: f64,
    raw: impl FnOnce() -> String,
) -> std::result::Result<f32, RowFailure> {
    let narrowed = value as f32;
    if narrowed.is_finite() {
        Ok(narrowed)
    } else {
        Err(RowFailure::ValueParse {
            column: column.to_string(),
            value: raw(),
        })
    }
}

fn parse_text_feature(column: &str, text: &str) -> std::result::Result<Option<f32>, RowFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_nan() => Ok(None),
        Ok(n) if n.is_finite() => narrow(column, n, || text.to_string()).map(Some),
        _ => Err(RowFailure::ValueParse {
            column: column.to_string(),
            value: text.to_string(),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::Null => "null",
    }
}

/// One named-feature record, e.g. the JSON body of a single prediction request.
pub type RawRecord = BTreeMap<String, RawValue>;

/// Table of untyped cells with named columns.
///
/// # Examples
///
/// ```
/// use koi_classifier::data::RawTable;
///
/// let csv = "# exported catalogue\nkoi_period,koi_depth\n9.48,616.0\n54.4,\n";
/// let table = RawTable::from_csv_reader(csv.as_bytes()).expect("valid csv");
/// assert_eq!(table.shape(), (2, 2));
/// assert!(table.cell(1, 1).is_missing());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    /// Creates a table from headers and rows.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate/empty headers or rows of the wrong width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawValue>>) -> Result<Self> {
        let mut names: Vec<&str> = headers.iter().map(String::as_str).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(KoiError::Data("Column names cannot be empty".to_string()));
        }
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(KoiError::Data(format!("Duplicate column name '{}'", dup[0])));
        }
        if let Some(pos) = rows.iter().position(|r| r.len() != headers.len()) {
            return Err(KoiError::Data(format!(
                "Row {pos} has {} cells, expected {}",
                rows[pos].len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    /// Reads CSV with a header row. Lines starting with `#` are comments.
    ///
    /// Short rows are padded with nulls; rows longer than the header are rejected.
    /// A cell that is not valid UTF-8 is kept as lossy text, so it fails only
    /// its own row if that column is ever parsed as a feature.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV cannot be parsed.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for (line, record) in csv_reader.byte_records().enumerate() {
            let record = record?;
            if record.len() > headers.len() {
                return Err(KoiError::Data(format!(
                    "Data row {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    headers.len()
                )));
            }
            let mut row: Vec<RawValue> = record.iter().map(csv_cell).collect();
            row.resize(headers.len(), RawValue::Null);
            rows.push(row);
        }

        Self::new(headers, rows)
    }

    /// Reads a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    /// Builds a table from records; columns are the union of keys, keys absent
    /// from a record become null cells.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no columns at all.
    pub fn from_records(records: Vec<RawRecord>) -> Result<Self> {
        let mut headers: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
        if headers.is_empty() {
            return Err(KoiError::empty_input("records carry no columns"));
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                headers
                    .iter()
                    .map(|h| record.remove(h).unwrap_or(RawValue::Null))
                    .collect()
            })
            .collect();

        Self::new(headers, rows)
    }

    /// Parses a JSON array of objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not an array of objects.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<RawRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Returns the shape as (`n_rows`, `n_cols`).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Returns the column names in table order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Position of a column, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Borrows one row.
    ///
    /// # Panics
    ///
    /// Panics if the row index is out of bounds.
    #[must_use]
    pub fn row(&self, idx: usize) -> &[RawValue] {
        &self.rows[idx]
    }

    /// Borrows one cell.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> &RawValue {
        &self.rows[row][col]
    }

    /// Iterates over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[RawValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Columns whose every present cell is a finite number, in table order,
    /// skipping `exclude`.
    #[must_use]
    pub fn numeric_columns(&self, exclude: &[String]) -> Vec<String> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !exclude.contains(name))
            .filter(|(col, name)| {
                self.rows
                    .iter()
                    .all(|row| matches!(row[*col].to_feature(name), Ok(_)))
            })
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Extracts the named columns as a dense matrix, `NaN` marking missing cells.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is absent or a cell is not numeric.
    pub fn to_feature_matrix(&self, columns: &[String]) -> Result<Matrix<f32>> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| KoiError::Data(format!("Column '{name}' not found")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut data = Vec::with_capacity(self.rows.len() * indices.len());
        for row in &self.rows {
            for (&col, name) in indices.iter().zip(columns) {
                data.push(row[col].to_feature(name)?.unwrap_or(f32::NAN));
            }
        }

        Ok(Matrix::from_vec(self.rows.len(), indices.len(), data)?)
    }

    /// Reads a column as trimmed strings (labels, identifiers).
    ///
    /// # Errors
    ///
    /// Returns an error if the column doesn't exist.
    pub fn column_strings(&self, name: &str) -> Result<Vec<String>> {
        let col = self
            .column_index(name)
            .ok_or_else(|| KoiError::Data(format!("Column '{name}' not found")))?;
        Ok(self
            .rows
            .iter()
            .map(|row| row[col].as_id().trim().to_string())
            .collect())
    }
}

#[cfg(test)]
#[path = "data_tests.rs"]
mod tests;

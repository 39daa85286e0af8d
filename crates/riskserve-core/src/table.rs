//! Raw tabular input: sensor readings as CSV text or JSON

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Null,
}

impl Value {
    /// Numeric view of the cell; null reads as NaN, text has none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Null => Some(f64::NAN),
            Value::Text(_) => None,
        }
    }

    fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| Error::invalid_table(format!("unrepresentable number {}", n))),
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            serde_json::Value::Bool(b) => Ok(Value::Text(b.to_string())),
            serde_json::Value::Null => Ok(Value::Null),
            other => Err(Error::invalid_table(format!(
                "nested value not allowed in a cell: {}",
                other
            ))),
        }
    }
}

impl Value {
    fn from_csv_field(field: &str) -> Self {
        if field.is_empty() {
            return Value::Null;
        }
        match field.parse::<f64>() {
            Ok(v) => Value::Number(v),
            Err(_) => Value::Text(field.to_string()),
        }
    }
}

fn csv_error(err: csv::Error) -> Error {
    Error::invalid_table(format!("Invalid CSV content: {}", err))
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Ordered named columns with rows of cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRepr")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Accepted wire shapes for a table
#[derive(Deserialize)]
#[serde(untagged)]
enum TableRepr {
    Columnar {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    Records(Vec<serde_json::Map<String, serde_json::Value>>),
}

impl TryFrom<TableRepr> for Table {
    type Error = Error;

    fn try_from(repr: TableRepr) -> Result<Self> {
        match repr {
            TableRepr::Columnar { columns, rows } => {
                let rows = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(Value::from_json).collect())
                    .collect::<Result<Vec<Vec<Value>>>>()?;
                Table::new(columns, rows)
            }
            TableRepr::Records(records) => Table::from_records(records),
        }
    }
}

impl Table {
    /// Create a table, validating row widths and column-name uniqueness
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(Error::invalid_table(format!("duplicate column '{}'", column)));
            }
        }

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::invalid_table(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }

        Ok(Self { columns, rows })
    }

    /// Build a table from JSON records; the first record fixes column order
    /// and keys first seen later are appended
    pub fn from_records(records: Vec<serde_json::Map<String, serde_json::Value>>) -> Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        let mut known: HashSet<String> = HashSet::new();
        for record in &records {
            for key in record.keys() {
                if known.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(records.len());
        for mut record in records {
            let mut row = Vec::with_capacity(columns.len());
            for column in &columns {
                let cell = record.remove(column).unwrap_or(serde_json::Value::Null);
                row.push(Value::from_json(cell)?);
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Parse CSV text with a header row
    ///
    /// Cells that parse as numbers become `Number`, empty cells `Null`, and
    /// anything else `Text`. Ragged rows are rejected.
    pub fn from_csv(data: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(Error::invalid_table("Invalid CSV content: missing header row"));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(record.iter().map(Value::from_csv_field).collect());
        }

        Self::new(columns, rows)
    }

    /// Convenience constructor for an all-numeric table
    pub fn from_numeric(columns: &[&str], rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|row| row.into_iter().map(Value::Number).collect())
                .collect(),
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// True if every cell in the column is a number or null
    pub fn is_numeric(&self, index: usize) -> bool {
        self.rows
            .iter()
            .all(|row| !matches!(row[index], Value::Text(_)))
    }

    /// Indices of numeric columns, in table order
    pub fn numeric_column_indices(&self) -> Vec<usize> {
        (0..self.columns.len()).filter(|&i| self.is_numeric(i)).collect()
    }

    /// Values of one column as numbers
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| Error::missing_columns([name]))?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row[index].as_f64().ok_or_else(|| {
                    Error::invalid_table(format!(
                        "column '{}' has a non-numeric value at row {}",
                        name, i
                    ))
                })
            })
            .collect()
    }

    /// Select and reorder columns; absent ones fail with their sorted names
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name) {
                Some(i) => indices.push(i),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::missing_columns(missing));
        }

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Table::new(names.to_vec(), rows)
    }

    /// The last `n` rows (or all of them if fewer)
    pub fn tail(&self, n: usize) -> Table {
        let start = self.rows.len().saturating_sub(n);
        Table {
            columns: self.columns.clone(),
            rows: self.rows[start..].to_vec(),
        }
    }

    /// Convert the given columns to a numeric matrix
    pub fn columns_to_matrix(&self, indices: &[usize]) -> Result<Matrix> {
        let mut data = Vec::with_capacity(self.rows.len() * indices.len());
        for (r, row) in self.rows.iter().enumerate() {
            for &c in indices {
                let value = row[c].as_f64().ok_or_else(|| {
                    Error::invalid_table(format!(
                        "column '{}' has a non-numeric value at row {}",
                        self.columns[c], r
                    ))
                })?;
                data.push(value);
            }
        }
        Matrix::new(self.rows.len(), indices.len(), data)
    }

    /// Convert the whole table to a numeric matrix
    pub fn to_matrix(&self) -> Result<Matrix> {
        let all: Vec<usize> = (0..self.columns.len()).collect();
        self.columns_to_matrix(&all)
    }
}

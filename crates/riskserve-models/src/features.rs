//! Feature pipelines: pure transforms from a raw table to model input
//!
//! Each model family prepares its input differently:
//! - `PassThrough` selects/reorders the columns a tabular model was fitted on
//! - `SlidingWindowAggregate` summarizes the last window of sensor readings
//!   into one feature vector (mean, population std, last - first per sensor)
//! - `SequenceWindower` cuts every contiguous window of numeric rows for
//!   sequence models
//!
//! The variant is chosen when an artifact is loaded and never changes after.

use riskserve_core::{Error, Matrix, Result, Table};
use serde::{Deserialize, Serialize};

/// Input preparation attached to a model handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeaturePipeline {
    /// Select and reorder `expected_columns`, or use the table as-is
    PassThrough {
        #[serde(default)]
        expected_columns: Option<Vec<String>>,
    },

    /// Aggregate the last `window_size` rows of each sensor column
    SlidingWindowAggregate {
        window_size: usize,
        sensor_columns: Vec<String>,
    },

    /// Every contiguous `window_size`-row window over the numeric columns
    SequenceWindower { window_size: usize },
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::PassThrough {
            expected_columns: None,
        }
    }
}

impl FeaturePipeline {
    /// Pass-through pipeline over a fixed column order
    pub fn columns(expected: Vec<String>) -> Self {
        Self::PassThrough {
            expected_columns: Some(expected),
        }
    }

    pub fn expected_columns(&self) -> Option<&[String]> {
        match self {
            Self::PassThrough { expected_columns } => expected_columns.as_deref(),
            _ => None,
        }
    }

    pub fn window_size(&self) -> Option<usize> {
        match self {
            Self::PassThrough { .. } => None,
            Self::SlidingWindowAggregate { window_size, .. }
            | Self::SequenceWindower { window_size } => Some(*window_size),
        }
    }

    pub fn sensor_columns(&self) -> Option<&[String]> {
        match self {
            Self::SlidingWindowAggregate { sensor_columns, .. } => Some(sensor_columns),
            _ => None,
        }
    }

    /// Number of features produced per item, when fixed by configuration
    pub fn output_width(&self) -> Option<usize> {
        match self {
            Self::PassThrough { expected_columns } => expected_columns.as_ref().map(Vec::len),
            Self::SlidingWindowAggregate { sensor_columns, .. } => Some(3 * sensor_columns.len()),
            Self::SequenceWindower { .. } => None,
        }
    }

    /// Reject configurations that can never produce features
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::PassThrough { .. } => Ok(()),
            Self::SlidingWindowAggregate {
                window_size,
                sensor_columns,
            } => {
                if *window_size == 0 {
                    return Err(Error::load("sliding window size must be at least 1"));
                }
                if sensor_columns.is_empty() {
                    return Err(Error::load("sliding window needs at least one sensor column"));
                }
                Ok(())
            }
            Self::SequenceWindower { window_size } => {
                if *window_size == 0 {
                    return Err(Error::load("sequence window size must be at least 1"));
                }
                Ok(())
            }
        }
    }

    /// Turn a raw table into model input
    pub fn transform(&self, table: &Table) -> Result<Features> {
        self.validate()?;
        match self {
            Self::PassThrough { expected_columns } => {
                let matrix = match expected_columns {
                    Some(columns) => table.select(columns)?.to_matrix()?,
                    None => table.to_matrix()?,
                };
                Ok(Features::Tabular(matrix))
            }
            Self::SlidingWindowAggregate {
                window_size,
                sensor_columns,
            } => sliding_window_aggregate(table, *window_size, sensor_columns)
                .map(|v| Features::Tabular(Matrix::row_vector(v))),
            Self::SequenceWindower { window_size } => {
                sequence_windows(table, *window_size).map(Features::Sequences)
            }
        }
    }
}

fn sliding_window_aggregate(
    table: &Table,
    window_size: usize,
    sensor_columns: &[String],
) -> Result<Vec<f64>> {
    if table.row_count() < window_size {
        return Err(Error::insufficient_data(window_size, table.row_count()));
    }

    let missing: Vec<&String> = sensor_columns
        .iter()
        .filter(|s| !table.has_column(s))
        .collect();
    if !missing.is_empty() {
        return Err(Error::missing_columns(missing.into_iter().cloned()));
    }

    let window = table.tail(window_size);
    let mut features = Vec::with_capacity(3 * sensor_columns.len());
    for sensor in sensor_columns {
        let values = window.numeric_column(sensor)?;
        let (mean, std) = mean_and_std(&values);
        let delta = values[values.len() - 1] - values[0];
        features.extend([mean, std, delta]);
    }
    Ok(features)
}

/// Mean and population standard deviation
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn sequence_windows(table: &Table, window_size: usize) -> Result<SequenceWindows> {
    if table.row_count() < window_size {
        return Err(Error::insufficient_data(window_size, table.row_count()));
    }

    let numeric = table.numeric_column_indices();
    if numeric.is_empty() {
        return Err(Error::schema("no numeric columns found in input"));
    }

    let data = table.columns_to_matrix(&numeric)?;
    Ok(SequenceWindows { data, window_size })
}

/// Prepared model input
#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    /// One feature vector per row
    Tabular(Matrix),
    /// Overlapping windows over a numeric row sequence
    Sequences(SequenceWindows),
}

impl Features {
    /// Number of features per row
    pub fn feature_count(&self) -> usize {
        match self {
            Self::Tabular(m) => m.cols(),
            Self::Sequences(s) => s.feature_count(),
        }
    }

    /// Number of items a predictor will produce outputs for
    pub fn item_count(&self) -> usize {
        match self {
            Self::Tabular(m) => m.rows(),
            Self::Sequences(s) => s.len(),
        }
    }

    /// Rows every per-feature transform must be applied to
    pub fn rows_mut(&mut self) -> &mut Matrix {
        match self {
            Self::Tabular(m) => m,
            Self::Sequences(s) => &mut s.data,
        }
    }
}

/// All contiguous windows of `window_size` rows, step 1
///
/// Windows are borrowed slices of the underlying row data, produced on
/// iteration. Iterating twice yields identical windows.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindows {
    data: Matrix,
    window_size: usize,
}

impl SequenceWindows {
    pub fn new(data: Matrix, window_size: usize) -> Result<Self> {
        if window_size == 0 || data.rows() < window_size {
            return Err(Error::insufficient_data(window_size.max(1), data.rows()));
        }
        Ok(Self { data, window_size })
    }

    /// `rows - window_size + 1`
    pub fn len(&self) -> usize {
        self.data.rows() + 1 - self.window_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn feature_count(&self) -> usize {
        self.data.cols()
    }

    /// Underlying rows in original order
    pub fn rows(&self) -> &Matrix {
        &self.data
    }

    /// Iterate windows as flat row-major `window_size × feature_count` slices
    pub fn iter(&self) -> Windows<'_> {
        Windows {
            data: self.data.as_slice(),
            stride: self.data.cols(),
            width: self.window_size * self.data.cols(),
            next: 0,
            remaining: self.len(),
        }
    }

    /// Window `i` as an owned matrix
    pub fn window(&self, i: usize) -> Option<Matrix> {
        (i < self.len()).then(|| self.data.slice_rows(i, i + self.window_size))
    }
}

impl<'a> IntoIterator for &'a SequenceWindows {
    type Item = &'a [f64];
    type IntoIter = Windows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over sequence windows
pub struct Windows<'a> {
    data: &'a [f64],
    stride: usize,
    width: usize,
    next: usize,
    remaining: usize,
}

impl<'a> Iterator for Windows<'a> {
    type Item = &'a [f64];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let start = self.next * self.stride;
        self.next += 1;
        self.remaining -= 1;
        Some(&self.data[start..start + self.width])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}

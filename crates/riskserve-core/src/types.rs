//! Prediction result and response types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit attached to remaining-useful-life outputs when the artifact names none
pub const DEFAULT_UNIT: &str = "cycles";

/// How a model's raw output is shaped, fixed when the artifact is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// One class label for the whole input table
    SingleClass,
    /// One class label per input row
    MultiRowClassification,
    /// Continuous values (e.g. remaining useful life)
    Regression,
}

impl ModelFamily {
    pub fn is_classification(&self) -> bool {
        !matches!(self, Self::Regression)
    }
}

/// Output of one `ModelHandle::predict` call
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Family of the model that produced this result
    pub family: ModelFamily,

    /// Raw predicted values: class codes for classifiers, estimates for regressors
    pub raw_values: Vec<f64>,

    /// Labels mapped from class codes (classifiers only)
    pub labels: Option<Vec<String>>,

    /// Per-item class probabilities, when the predictor exposes them
    pub probabilities: Option<Vec<Vec<f64>>>,

    /// Unit of regression outputs
    pub unit: Option<String>,

    /// Number of sequence windows fed to the predictor (sequence models only)
    pub windows: Option<usize>,
}

impl PredictionResult {
    /// Class codes of a classification result
    pub fn class_codes(&self) -> Vec<i64> {
        if !self.family.is_classification() {
            return Vec::new();
        }
        self.raw_values.iter().map(|v| v.round() as i64).collect()
    }
}

/// Normalized per-item entry in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionItem {
    /// A classified row (or whole table)
    Class {
        code: i64,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        probabilities: Option<Vec<f64>>,
    },
    /// A numeric estimate
    Value { value: f64, unit: String },
}

/// Derived risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Uniform response returned by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Model name the request was dispatched to
    pub model: String,

    /// Input row count
    pub rows: usize,

    /// Normalized per-item results
    pub prediction: Vec<PredictionItem>,

    /// Human-readable summary
    pub summary: String,

    /// Risk level; absent for numeric-output models
    pub risk_level: Option<RiskLevel>,

    /// Sequence windows used (sequence models only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<usize>,
}

//! riskserve Core
//!
//! Core types shared across the riskserve components.
//!
//! This crate provides:
//! - The raw input `Table` submitted by clients (named columns of sensor readings)
//! - A dense row-major `Matrix` used as model input
//! - Prediction result and response shapes, including `RiskLevel`
//! - Error types and result handling

pub mod error;
pub mod matrix;
pub mod table;
pub mod types;

pub use error::{Error, Result};
pub use matrix::Matrix;
pub use table::{Table, Value};
pub use types::{
    ModelFamily, PredictionItem, PredictionResponse, PredictionResult, RiskLevel,
    DEFAULT_UNIT,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::matrix::Matrix;
    pub use crate::table::{Table, Value};
    pub use crate::types::{ModelFamily, PredictionResponse, PredictionResult, RiskLevel};
}

//! Per-feature affine normalization fitted at training time

use crate::features::Features;
use riskserve_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Standard scaler: `(x - mean) / scale` per feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Fitted dimensionality
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(Error::load(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        Ok(())
    }

    /// Normalize every row in place
    ///
    /// Applies to each row of tabular input and to each row of every window
    /// for sequence input.
    pub fn transform(&self, features: &mut Features) -> Result<()> {
        let cols = features.feature_count();
        if cols != self.dim() {
            return Err(Error::inference(format!(
                "X has {} features, but the scaler was fitted with {} features",
                cols,
                self.dim()
            )));
        }

        let rows = features.rows_mut();
        for row in rows.as_mut_slice().chunks_exact_mut(cols.max(1)) {
            for ((x, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
                // zero-variance features are left centered, not divided
                let s = if *scale == 0.0 { 1.0 } else { *scale };
                *x = (*x - mean) / s;
            }
        }
        Ok(())
    }
}

//! Predictor trait and common types

use crate::features::Features;
use riskserve_core::{Error, Matrix, Result};

/// Trait for all wrapped predictive models
///
/// Implementations are opaque: they see prepared (and possibly scaled)
/// features and return one value per item. Invocation is synchronous.
pub trait Predictor: Send + Sync {
    /// Primary prediction: class codes for classifiers, estimates for regressors
    fn predict(&self, features: &Features) -> Result<Vec<f64>>;

    /// Class probabilities, one distribution per item
    ///
    /// Only called when `supports_proba` returns true.
    fn predict_proba(&self, _features: &Features) -> Result<Vec<Vec<f64>>> {
        Err(Error::inference(format!(
            "{} does not expose class probabilities",
            self.kind()
        )))
    }

    /// Whether `predict_proba` is available
    fn supports_proba(&self) -> bool {
        false
    }

    /// What the outputs mean
    fn task(&self) -> PredictorTask;

    /// Short model-kind name (for logs and metadata)
    fn kind(&self) -> &str;

    /// Input width the predictor was fitted with, when known
    fn input_width(&self) -> Option<usize> {
        None
    }
}

/// Kind of output a predictor produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorTask {
    /// Integer class codes
    Classification,
    /// Continuous values
    Regression,
}

/// Borrow tabular input, rejecting sequence windows
pub(crate) fn expect_tabular<'a>(features: &'a Features, kind: &str) -> Result<&'a Matrix> {
    match features {
        Features::Tabular(m) => Ok(m),
        Features::Sequences(_) => Err(Error::inference(format!(
            "{} expects tabular input, got sequence windows",
            kind
        ))),
    }
}

/// Index of the largest value; first wins on ties
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable softmax
pub(crate) fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

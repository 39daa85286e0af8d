//! Decision-model predictors deserialized from JSON artifacts
//!
//! Tree ensembles are stored as flat node arrays (the layout most training
//! toolkits export). A split sends `x[feature] <= threshold` left; NaN goes
//! right.

use crate::features::Features;
use crate::predictor::{argmax, expect_tabular, softmax, Predictor, PredictorTask};
use riskserve_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A serialized decision model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionModel {
    /// Averaged-probability tree ensemble over class codes
    ForestClassifier {
        classes: Vec<i64>,
        trees: Vec<Tree>,
        #[serde(default)]
        n_features: Option<usize>,
    },

    /// Mean-of-trees regressor
    ForestRegressor {
        trees: Vec<Tree>,
        #[serde(default)]
        n_features: Option<usize>,
    },

    /// Multinomial (or binary, with one coefficient row) logistic regression
    LogisticRegression {
        classes: Vec<i64>,
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
    },

    /// Ordinary linear regression
    LinearRegression { coef: Vec<f64>, intercept: f64 },
}

/// One decision tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

impl Tree {
    fn validate(&self, leaf_width: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::load("tree has no nodes"));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split { left, right, .. } => {
                    // children must come later, which also rules out cycles
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(Error::load(format!(
                                "node {} points to invalid child {}",
                                i, child
                            )));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != leaf_width {
                        return Err(Error::load(format!(
                            "leaf {} has {} values, expected {}",
                            i,
                            value.len(),
                            leaf_width
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf(&self, x: &[f64]) -> Result<&[f64]> {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return Ok(value),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = x.get(*feature).ok_or_else(|| {
                        Error::inference(format!(
                            "split on feature {} but input has {} features",
                            feature,
                            x.len()
                        ))
                    })?;
                    index = if *v <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl DecisionModel {
    /// Structural checks run once at load time
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ForestClassifier { classes, trees, .. } => {
                if classes.is_empty() {
                    return Err(Error::load("classifier has no classes"));
                }
                if trees.is_empty() {
                    return Err(Error::load("forest has no trees"));
                }
                trees.iter().try_for_each(|t| t.validate(classes.len()))
            }
            Self::ForestRegressor { trees, .. } => {
                if trees.is_empty() {
                    return Err(Error::load("forest has no trees"));
                }
                trees.iter().try_for_each(|t| t.validate(1))
            }
            Self::LogisticRegression {
                classes,
                coef,
                intercept,
            } => {
                let expected_rows = if classes.len() == 2 { 1 } else { classes.len() };
                let binary_full = classes.len() == 2 && coef.len() == 2;
                if classes.len() < 2 || (coef.len() != expected_rows && !binary_full) {
                    return Err(Error::load(format!(
                        "logistic regression has {} coefficient rows for {} classes",
                        coef.len(),
                        classes.len()
                    )));
                }
                if intercept.len() != coef.len() {
                    return Err(Error::load("intercept length does not match coefficients"));
                }
                let width = coef[0].len();
                if coef.iter().any(|row| row.len() != width) {
                    return Err(Error::load("coefficient rows differ in width"));
                }
                Ok(())
            }
            Self::LinearRegression { .. } => Ok(()),
        }
    }

    /// Class codes for classifiers
    pub fn classes(&self) -> Option<&[i64]> {
        match self {
            Self::ForestClassifier { classes, .. } | Self::LogisticRegression { classes, .. } => {
                Some(classes)
            }
            _ => None,
        }
    }

    fn class_distributions(&self, features: &Features) -> Result<Vec<Vec<f64>>> {
        let x = expect_tabular(features, self.kind())?;
        match self {
            Self::ForestClassifier { classes, trees, .. } => x
                .iter_rows()
                .map(|row| {
                    let mut acc = vec![0.0; classes.len()];
                    for tree in trees {
                        let leaf = tree.leaf(row)?;
                        let total: f64 = leaf.iter().sum();
                        for (a, v) in acc.iter_mut().zip(leaf) {
                            *a += if total > 0.0 { v / total } else { 0.0 };
                        }
                    }
                    let n = trees.len() as f64;
                    Ok(acc.into_iter().map(|a| a / n).collect())
                })
                .collect(),
            Self::LogisticRegression {
                coef, intercept, ..
            } => {
                check_width(coef[0].len(), x.cols())?;
                Ok(x.iter_rows()
                    .map(|row| {
                        let scores: Vec<f64> = coef
                            .iter()
                            .zip(intercept)
                            .map(|(w, b)| dot(w, row) + b)
                            .collect();
                        if scores.len() == 1 {
                            let p = 1.0 / (1.0 + (-scores[0]).exp());
                            vec![1.0 - p, p]
                        } else {
                            softmax(&scores)
                        }
                    })
                    .collect())
            }
            _ => Err(Error::inference(format!(
                "{} does not expose class probabilities",
                self.kind()
            ))),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn check_width(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::inference(format!(
            "model expects {} features, got {}",
            expected, actual
        )));
    }
    Ok(())
}

impl Predictor for DecisionModel {
    fn predict(&self, features: &Features) -> Result<Vec<f64>> {
        match self {
            Self::ForestClassifier { classes, .. } | Self::LogisticRegression { classes, .. } => {
                Ok(self
                    .class_distributions(features)?
                    .iter()
                    .map(|p| classes[argmax(p)] as f64)
                    .collect())
            }
            Self::ForestRegressor { trees, .. } => {
                let x = expect_tabular(features, self.kind())?;
                x.iter_rows()
                    .map(|row| {
                        let mut sum = 0.0;
                        for tree in trees {
                            sum += tree.leaf(row)?[0];
                        }
                        Ok(sum / trees.len() as f64)
                    })
                    .collect()
            }
            Self::LinearRegression { coef, intercept } => {
                let x = expect_tabular(features, self.kind())?;
                check_width(coef.len(), x.cols())?;
                Ok(x.iter_rows().map(|row| dot(coef, row) + intercept).collect())
            }
        }
    }

    fn predict_proba(&self, features: &Features) -> Result<Vec<Vec<f64>>> {
        self.class_distributions(features)
    }

    fn supports_proba(&self) -> bool {
        matches!(
            self,
            Self::ForestClassifier { .. } | Self::LogisticRegression { .. }
        )
    }

    fn task(&self) -> PredictorTask {
        match self {
            Self::ForestClassifier { .. } | Self::LogisticRegression { .. } => {
                PredictorTask::Classification
            }
            Self::ForestRegressor { .. } | Self::LinearRegression { .. } => {
                PredictorTask::Regression
            }
        }
    }

    fn kind(&self) -> &str {
        match self {
            Self::ForestClassifier { .. } => "forest_classifier",
            Self::ForestRegressor { .. } => "forest_regressor",
            Self::LogisticRegression { .. } => "logistic_regression",
            Self::LinearRegression { .. } => "linear_regression",
        }
    }

    fn input_width(&self) -> Option<usize> {
        match self {
            Self::ForestClassifier { n_features, .. } | Self::ForestRegressor { n_features, .. } => {
                *n_features
            }
            Self::LogisticRegression { coef, .. } => coef.first().map(Vec::len),
            Self::LinearRegression { coef, .. } => Some(coef.len()),
        }
    }
}

//! Serialized artifact shapes: bare-or-bundled decision models and
//! neural checkpoint configuration

use crate::decision::DecisionModel;
use crate::features::FeaturePipeline;
use crate::scaler::StandardScaler;
use riskserve_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Class code → human-readable label
pub type LabelMap = BTreeMap<i64, String>;

/// Window length used by sequence checkpoints that do not specify one
pub const DEFAULT_SEQUENCE_LENGTH: usize = 30;

/// Label for class codes missing from the label map
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Fallback three-state maintenance label table
pub fn default_label_map() -> LabelMap {
    BTreeMap::from([
        (0, "HEALTHY".to_string()),
        (1, "MAINTENANCE".to_string()),
        (2, "REPLACE".to_string()),
    ])
}

/// A decision-model artifact, disambiguated once at load time
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactBundle {
    /// Predictor stored on its own
    Bare(DecisionModel),

    /// Predictor stored with its preprocessing and labels
    Bundle {
        model: DecisionModel,
        scaler: Option<StandardScaler>,
        feature_pipeline: Option<FeaturePipeline>,
        label_map: Option<LabelMap>,
        unit: Option<String>,
    },
}

#[derive(Deserialize)]
struct BundleFields {
    model: DecisionModel,
    #[serde(default)]
    scaler: Option<StandardScaler>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    #[serde(default)]
    feature_extractor: Option<FeaturePipeline>,
    #[serde(default)]
    label_map: Option<LabelMap>,
    #[serde(default)]
    unit: Option<String>,
}

impl ArtifactBundle {
    /// Parse an artifact; an object with a `model` key is a bundle
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::load(format!("artifact is not valid JSON: {}", e)))?;

        if value.get("model").is_none() {
            let model = serde_json::from_value(value)
                .map_err(|e| Error::load(format!("invalid decision model: {}", e)))?;
            return Ok(Self::Bare(model));
        }

        let fields: BundleFields = serde_json::from_value(value)
            .map_err(|e| Error::load(format!("invalid model bundle: {}", e)))?;

        let feature_pipeline = match (fields.feature_names, fields.feature_extractor) {
            (Some(_), Some(_)) => {
                return Err(Error::load(
                    "bundle sets both feature_names and feature_extractor",
                ))
            }
            (Some(names), None) => Some(FeaturePipeline::columns(names)),
            (None, extractor) => extractor,
        };

        Ok(Self::Bundle {
            model: fields.model,
            scaler: fields.scaler,
            feature_pipeline,
            label_map: fields.label_map,
            unit: fields.unit,
        })
    }

    pub fn model(&self) -> &DecisionModel {
        match self {
            Self::Bare(model) | Self::Bundle { model, .. } => model,
        }
    }
}

/// Optional configuration embedded in a neural checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub window_size: Option<usize>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub sensor_columns: Option<Vec<String>>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub label_map: Option<LabelMap>,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
}

impl CheckpointConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::load(format!("invalid checkpoint config: {}", e)))
    }

    /// Pipeline for a checkpoint, given whether it is a sequence network
    pub fn pipeline(&self, sequence_model: bool) -> FeaturePipeline {
        let window_size = self.window_size.unwrap_or(DEFAULT_SEQUENCE_LENGTH);
        if sequence_model {
            FeaturePipeline::SequenceWindower { window_size }
        } else if let Some(sensors) = &self.sensor_columns {
            FeaturePipeline::SlidingWindowAggregate {
                window_size,
                sensor_columns: sensors.clone(),
            }
        } else {
            FeaturePipeline::PassThrough {
                expected_columns: self.feature_names.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUMP: &str = r#"{"kind": "forest_classifier", "classes": [0, 1, 2],
        "trees": [{"nodes": [{"value": [1, 0, 0]}]}]}"#;

    #[test]
    fn test_bare_model() {
        let bundle = ArtifactBundle::from_slice(STUMP.as_bytes()).unwrap();
        assert!(matches!(bundle, ArtifactBundle::Bare(_)));
    }

    #[test]
    fn test_bundle_with_feature_names() {
        let json = format!(
            r#"{{"model": {}, "feature_names": ["s2", "s3"], "label_map": {{"0": "OK"}}}}"#,
            STUMP
        );
        let bundle = ArtifactBundle::from_slice(json.as_bytes()).unwrap();
        match bundle {
            ArtifactBundle::Bundle {
                feature_pipeline,
                label_map,
                scaler,
                ..
            } => {
                assert_eq!(
                    feature_pipeline.unwrap().expected_columns().unwrap(),
                    &["s2".to_string(), "s3".to_string()]
                );
                assert_eq!(label_map.unwrap().get(&0).unwrap(), "OK");
                assert!(scaler.is_none());
            }
            other => panic!("expected bundle, got {:?}", other),
        }
    }

    #[test]
    fn test_bundle_with_extractor() {
        let json = format!(
            r#"{{"model": {}, "feature_extractor": {{"type": "sliding_window_aggregate",
                "window_size": 30, "sensor_columns": ["s2"]}},
                "scaler": {{"mean": [0, 0, 0], "scale": [1, 1, 1]}}}}"#,
            STUMP
        );
        let bundle = ArtifactBundle::from_slice(json.as_bytes()).unwrap();
        let ArtifactBundle::Bundle { feature_pipeline, .. } = bundle else {
            panic!("expected bundle");
        };
        assert_eq!(feature_pipeline.unwrap().window_size(), Some(30));
    }

    #[test]
    fn test_conflicting_feature_pipeline_rejected() {
        let json = format!(
            r#"{{"model": {}, "feature_names": ["a"],
                "feature_extractor": {{"type": "sequence_windower", "window_size": 3}}}}"#,
            STUMP
        );
        assert!(matches!(
            ArtifactBundle::from_slice(json.as_bytes()),
            Err(Error::Load(_))
        ));
    }

    #[test]
    fn test_garbage_is_load_error() {
        assert!(matches!(
            ArtifactBundle::from_slice(b"\x80\x04pickle"),
            Err(Error::Load(_))
        ));
    }

    #[test]
    fn test_checkpoint_pipeline_defaults() {
        let config = CheckpointConfig::default();
        assert_eq!(
            config.pipeline(true),
            FeaturePipeline::SequenceWindower { window_size: 30 }
        );
        assert_eq!(config.pipeline(false), FeaturePipeline::default());
    }
}

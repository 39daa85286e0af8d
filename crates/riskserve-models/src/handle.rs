//! A loaded, ready-to-serve model

use crate::artifact::ArtifactDescriptor;
use crate::bundle::{default_label_map, LabelMap, UNKNOWN_LABEL};
use crate::features::{FeaturePipeline, Features};
use crate::predictor::{Predictor, PredictorTask};
use crate::scaler::StandardScaler;
use riskserve_core::{Error, ModelFamily, PredictionResult, Result, Table, DEFAULT_UNIT};
use std::fmt;

/// A model with its input preparation, labels and output unit
///
/// Handles are immutable once built. The registry shares them behind `Arc`
/// so a request keeps its handle alive even if a reload replaces it.
pub struct ModelHandle {
    descriptor: ArtifactDescriptor,
    pipeline: FeaturePipeline,
    scaler: Option<StandardScaler>,
    predictor: Box<dyn Predictor>,
    label_map: Option<LabelMap>,
    unit: Option<String>,
    family: ModelFamily,
}

impl ModelHandle {
    /// Wrap a predictor; classifiers start with the default label map
    pub fn new(
        descriptor: ArtifactDescriptor,
        pipeline: FeaturePipeline,
        predictor: Box<dyn Predictor>,
    ) -> Self {
        let family = match (predictor.task(), &pipeline) {
            (PredictorTask::Regression, _) => ModelFamily::Regression,
            (PredictorTask::Classification, FeaturePipeline::SlidingWindowAggregate { .. }) => {
                ModelFamily::SingleClass
            }
            (PredictorTask::Classification, _) => ModelFamily::MultiRowClassification,
        };
        let (label_map, unit) = match family {
            ModelFamily::Regression => (None, Some(DEFAULT_UNIT.to_string())),
            _ => (Some(default_label_map()), None),
        };

        Self {
            descriptor,
            pipeline,
            scaler: None,
            predictor,
            label_map,
            unit,
            family,
        }
    }

    pub fn with_scaler(mut self, scaler: Option<StandardScaler>) -> Self {
        self.scaler = scaler;
        self
    }

    /// Replace the label map of a classifier; ignored for regressors
    pub fn with_label_map(mut self, label_map: Option<LabelMap>) -> Self {
        if let (true, Some(map)) = (self.family.is_classification(), label_map) {
            self.label_map = Some(map);
        }
        self
    }

    /// Replace the output unit of a regressor; ignored for classifiers
    pub fn with_unit(mut self, unit: Option<String>) -> Self {
        if let (ModelFamily::Regression, Some(unit)) = (self.family, unit) {
            self.unit = Some(unit);
        }
        self
    }

    /// Check that pipeline, scaler and predictor agree on feature width
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        let mut width = self.pipeline.output_width();
        if let Some(scaler) = &self.scaler {
            scaler.validate()?;
            if let Some(w) = width.filter(|w| *w != scaler.dim()) {
                return Err(Error::load(format!(
                    "feature pipeline produces {} features but the scaler expects {}",
                    w,
                    scaler.dim()
                )));
            }
            width = Some(scaler.dim());
        }

        if let (Some(w), Some(expected)) = (width, self.predictor.input_width()) {
            if w != expected {
                return Err(Error::load(format!(
                    "{} expects {} features but its input preparation produces {}",
                    self.predictor.kind(),
                    expected,
                    w
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ArtifactDescriptor {
        &self.descriptor
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub fn label_map(&self) -> Option<&LabelMap> {
        self.label_map.as_ref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Short name of the wrapped predictor kind
    pub fn predictor_kind(&self) -> &str {
        self.predictor.kind()
    }

    pub fn supports_proba(&self) -> bool {
        self.predictor.supports_proba()
    }

    /// Label for a class code
    pub fn label(&self, code: i64) -> String {
        self.label_map
            .as_ref()
            .and_then(|m| m.get(&code))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
            .to_string()
    }

    /// Prepare the table, run the predictor and attach labels
    pub fn predict(&self, table: &Table) -> Result<PredictionResult> {
        let mut features = self.pipeline.transform(table)?;
        if let Some(scaler) = &self.scaler {
            scaler.transform(&mut features)?;
        }

        let raw_values = self.predictor.predict(&features).map_err(|e| match e {
            Error::Inference(_) => e,
            other => Error::inference(other.to_string()),
        })?;

        let probabilities = self.probabilities(&features, raw_values.len());

        let labels = self.family.is_classification().then(|| {
            raw_values
                .iter()
                .map(|v| self.label(v.round() as i64))
                .collect()
        });

        let windows = match &features {
            Features::Sequences(windows) => Some(windows.len()),
            Features::Tabular(_) => None,
        };

        Ok(PredictionResult {
            family: self.family,
            raw_values,
            labels,
            probabilities,
            unit: self.unit.clone(),
            windows,
        })
    }

    /// Optional probability output; any failure means "absent"
    fn probabilities(&self, features: &Features, items: usize) -> Option<Vec<Vec<f64>>> {
        if !self.predictor.supports_proba() {
            return None;
        }
        match self.predictor.predict_proba(features) {
            Ok(p) if p.len() == items => Some(p),
            Ok(p) => {
                tracing::debug!(
                    model = %self.name(),
                    expected = items,
                    actual = p.len(),
                    "Discarding probabilities with mismatched length"
                );
                None
            }
            Err(e) => {
                tracing::debug!(model = %self.name(), error = %e, "Probability output unavailable");
                None
            }
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.descriptor.name)
            .field("format", &self.descriptor.format)
            .field("family", &self.family)
            .field("predictor", &self.predictor.kind())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifies each row by the sign of its first feature: code 2 if
    /// positive, else 0
    struct SignClassifier {
        proba_fails: bool,
    }

    impl Predictor for SignClassifier {
        fn predict(&self, features: &Features) -> Result<Vec<f64>> {
            let Features::Tabular(m) = features else {
                return Err(Error::inference("tabular only"));
            };
            Ok(m.iter_rows()
                .map(|r| if r[0] > 0.0 { 2.0 } else { 0.0 })
                .collect())
        }

        fn predict_proba(&self, features: &Features) -> Result<Vec<Vec<f64>>> {
            if self.proba_fails {
                return Err(Error::inference("no calibration"));
            }
            Ok(vec![vec![0.5, 0.5]; features.item_count()])
        }

        fn supports_proba(&self) -> bool {
            true
        }

        fn task(&self) -> PredictorTask {
            PredictorTask::Classification
        }

        fn kind(&self) -> &str {
            "sign"
        }
    }

    /// Regressor returning the same value for every item
    struct Constant(f64);

    impl Predictor for Constant {
        fn predict(&self, features: &Features) -> Result<Vec<f64>> {
            Ok(vec![self.0; features.item_count()])
        }

        fn task(&self) -> PredictorTask {
            PredictorTask::Regression
        }

        fn kind(&self) -> &str {
            "constant"
        }

        fn input_width(&self) -> Option<usize> {
            Some(2)
        }
    }

    fn descriptor(name: &str) -> ArtifactDescriptor {
        ArtifactDescriptor::from_path(format!("{}.json", name)).unwrap()
    }

    fn table(values: &[f64]) -> Table {
        Table::from_numeric(&["x"], values.iter().map(|v| vec![*v]).collect()).unwrap()
    }

    #[test]
    fn test_classifier_labels_and_default_map() {
        let handle = ModelHandle::new(
            descriptor("durability"),
            FeaturePipeline::default(),
            Box::new(SignClassifier { proba_fails: false }),
        );
        assert_eq!(handle.family(), ModelFamily::MultiRowClassification);

        let result = handle.predict(&table(&[1.0, -1.0])).unwrap();
        assert_eq!(result.raw_values, vec![2.0, 0.0]);
        assert_eq!(
            result.labels.unwrap(),
            vec!["REPLACE".to_string(), "HEALTHY".to_string()]
        );
        assert_eq!(result.probabilities.unwrap().len(), 2);
        assert!(result.unit.is_none());
    }

    #[test]
    fn test_unknown_code_label() {
        let handle = ModelHandle::new(
            descriptor("durability"),
            FeaturePipeline::default(),
            Box::new(SignClassifier { proba_fails: false }),
        )
        .with_label_map(Some(LabelMap::from([(0, "OK".to_string())])));
        let result = handle.predict(&table(&[3.0])).unwrap();
        assert_eq!(result.labels.unwrap(), vec!["Unknown".to_string()]);
    }

    #[test]
    fn test_failed_probabilities_are_absent() {
        let handle = ModelHandle::new(
            descriptor("durability"),
            FeaturePipeline::default(),
            Box::new(SignClassifier { proba_fails: true }),
        );
        let result = handle.predict(&table(&[1.0])).unwrap();
        assert!(result.probabilities.is_none());
        assert_eq!(result.raw_values, vec![2.0]);
    }

    #[test]
    fn test_sliding_window_classifier_is_single_class() {
        let handle = ModelHandle::new(
            descriptor("landing_gear"),
            FeaturePipeline::SlidingWindowAggregate {
                window_size: 2,
                sensor_columns: vec!["x".into()],
            },
            Box::new(SignClassifier { proba_fails: false }),
        );
        assert_eq!(handle.family(), ModelFamily::SingleClass);
        // mean of last two rows is positive
        let result = handle.predict(&table(&[-5.0, 1.0, 2.0])).unwrap();
        assert_eq!(result.raw_values, vec![2.0]);
    }

    #[test]
    fn test_regressor_windows_and_unit() {
        let handle = ModelHandle::new(
            descriptor("rul"),
            FeaturePipeline::SequenceWindower { window_size: 3 },
            Box::new(Constant(42.0)),
        );
        assert_eq!(handle.family(), ModelFamily::Regression);
        assert_eq!(handle.unit(), Some("cycles"));

        let t = Table::from_numeric(&["a", "b"], (0..5).map(|i| vec![i as f64, 0.0]).collect())
            .unwrap();
        let result = handle.predict(&t).unwrap();
        assert_eq!(result.windows, Some(3));
        assert_eq!(result.raw_values, vec![42.0; 3]);
        assert!(result.labels.is_none());
        assert!(result.class_codes().is_empty());
    }

    #[test]
    fn test_scaler_width_mismatch_is_inference_error() {
        let handle = ModelHandle::new(
            descriptor("durability"),
            FeaturePipeline::default(),
            Box::new(SignClassifier { proba_fails: false }),
        )
        .with_scaler(Some(StandardScaler::new(vec![0.0; 3], vec![1.0; 3]).unwrap()));
        let err = handle.predict(&table(&[1.0])).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_validate_catches_width_disagreement() {
        let handle = ModelHandle::new(
            descriptor("rul"),
            FeaturePipeline::columns(vec!["a".into(), "b".into(), "c".into()]),
            Box::new(Constant(1.0)),
        );
        assert!(matches!(handle.validate(), Err(Error::Load(_))));

        let ok = ModelHandle::new(
            descriptor("rul"),
            FeaturePipeline::columns(vec!["a".into(), "b".into()]),
            Box::new(Constant(1.0)),
        );
        ok.validate().unwrap();
    }
}

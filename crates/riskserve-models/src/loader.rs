//! Format-specific artifact loading
//!
//! Each supported file suffix maps to one [`ArtifactLoader`]. Loaders turn a
//! descriptor into a validated [`ModelHandle`] or fail with `Error::Load`;
//! they never touch registry state.

use crate::artifact::{ArtifactDescriptor, ArtifactFormat};
use crate::bundle::ArtifactBundle;
use crate::features::FeaturePipeline;
use crate::handle::ModelHandle;
use riskserve_core::{Error, Result};
use std::collections::HashMap;

#[cfg(feature = "ml-models")]
use crate::bundle::CheckpointConfig;
#[cfg(feature = "ml-models")]
use crate::neural::{Checkpoint, NeuralNetwork};
#[cfg(feature = "ml-models")]
use candle_core::Device;

/// Deserializes one artifact format into a model handle
pub trait ArtifactLoader: Send + Sync {
    /// Format this loader handles
    fn format(&self) -> ArtifactFormat;

    /// Load and validate the artifact at `descriptor.path`
    fn load(&self, descriptor: &ArtifactDescriptor) -> Result<ModelHandle>;
}

fn loaded(descriptor: &ArtifactDescriptor) -> ArtifactDescriptor {
    let mut descriptor = descriptor.clone();
    descriptor.mark_loaded();
    descriptor
}

/// `.json` decision models, bare or bundled
#[derive(Debug, Default, Clone, Copy)]
pub struct DecisionModelLoader;

impl ArtifactLoader for DecisionModelLoader {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::DecisionModel
    }

    fn load(&self, descriptor: &ArtifactDescriptor) -> Result<ModelHandle> {
        let bytes = std::fs::read(&descriptor.path).map_err(|e| {
            Error::load(format!("Failed to read {}: {}", descriptor.path.display(), e))
        })?;

        let (model, pipeline, scaler, label_map, unit) = match ArtifactBundle::from_slice(&bytes)? {
            ArtifactBundle::Bare(model) => (model, FeaturePipeline::default(), None, None, None),
            ArtifactBundle::Bundle {
                model,
                scaler,
                feature_pipeline,
                label_map,
                unit,
            } => (model, feature_pipeline.unwrap_or_default(), scaler, label_map, unit),
        };
        model.validate()?;

        let handle = ModelHandle::new(loaded(descriptor), pipeline, Box::new(model))
            .with_scaler(scaler)
            .with_label_map(label_map)
            .with_unit(unit);
        handle.validate()?;
        Ok(handle)
    }
}

/// `.safetensors` checkpoints, with optional embedded configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetensorsLoader;

impl ArtifactLoader for SafetensorsLoader {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::NeuralCheckpointA
    }

    fn load(&self, descriptor: &ArtifactDescriptor) -> Result<ModelHandle> {
        #[cfg(feature = "ml-models")]
        {
            let checkpoint = Checkpoint::read_safetensors(&descriptor.path, &Device::Cpu)?;
            build_neural_handle(descriptor, checkpoint)
        }

        #[cfg(not(feature = "ml-models"))]
        {
            Err(missing_runtime(descriptor))
        }
    }
}

/// `.pt` / `.pth` PyTorch state dicts
#[derive(Debug, Default, Clone, Copy)]
pub struct TorchLoader;

impl ArtifactLoader for TorchLoader {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::NeuralCheckpointB
    }

    fn load(&self, descriptor: &ArtifactDescriptor) -> Result<ModelHandle> {
        #[cfg(feature = "ml-models")]
        {
            let checkpoint = Checkpoint::read_torch(&descriptor.path, &Device::Cpu)?;
            build_neural_handle(descriptor, checkpoint)
        }

        #[cfg(not(feature = "ml-models"))]
        {
            Err(missing_runtime(descriptor))
        }
    }
}

#[cfg(not(feature = "ml-models"))]
fn missing_runtime(descriptor: &ArtifactDescriptor) -> Error {
    Error::load(format!(
        "cannot load {}: neural checkpoints require the 'ml-models' feature (missing runtime)",
        descriptor.path.display()
    ))
}

#[cfg(feature = "ml-models")]
fn build_neural_handle(descriptor: &ArtifactDescriptor, checkpoint: Checkpoint) -> Result<ModelHandle> {
    let config = checkpoint
        .config_json
        .as_deref()
        .map(CheckpointConfig::from_json)
        .transpose()?
        .unwrap_or_default();

    let network = NeuralNetwork::from_tensors(checkpoint.tensors, &Device::Cpu)?;
    let pipeline = config.pipeline(network.is_sequence_model());

    tracing::debug!(
        model = %descriptor.name,
        outputs = network.outputs(),
        sequence = network.is_sequence_model(),
        "Restored neural checkpoint"
    );

    let handle = ModelHandle::new(loaded(descriptor), pipeline, Box::new(network))
        .with_scaler(config.scaler)
        .with_label_map(config.label_map)
        .with_unit(config.unit);
    handle.validate()?;
    Ok(handle)
}

/// The loader for every recognized format
pub struct LoaderSet {
    loaders: HashMap<ArtifactFormat, Box<dyn ArtifactLoader>>,
}

impl LoaderSet {
    /// An empty set; every format fails to load
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Register (or replace) the loader for its format
    pub fn register(&mut self, loader: Box<dyn ArtifactLoader>) {
        self.loaders.insert(loader.format(), loader);
    }

    /// Dispatch to the loader for the descriptor's format
    pub fn load(&self, descriptor: &ArtifactDescriptor) -> Result<ModelHandle> {
        let loader = self.loaders.get(&descriptor.format).ok_or_else(|| {
            Error::load(format!(
                "no loader registered for format {}",
                descriptor.format.as_str()
            ))
        })?;
        loader.load(descriptor)
    }
}

impl Default for LoaderSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register(Box::new(DecisionModelLoader));
        set.register(Box::new(SafetensorsLoader));
        set.register(Box::new(TorchLoader));
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskserve_core::{ModelFamily, Table};
    use std::io::Write;

    fn write_artifact(dir: &tempfile::TempDir, file: &str, contents: &[u8]) -> ArtifactDescriptor {
        let path = dir.path().join(file);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents)
            .unwrap();
        ArtifactDescriptor::from_path(path).unwrap()
    }

    #[test]
    fn test_bare_linear_regression() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_artifact(
            &dir,
            "rul.json",
            br#"{"kind": "linear_regression", "coef": [2.0, 0.0], "intercept": 1.0}"#,
        );

        let handle = DecisionModelLoader.load(&descriptor).unwrap();
        assert_eq!(handle.family(), ModelFamily::Regression);
        assert_eq!(handle.unit(), Some("cycles"));
        assert_eq!(handle.descriptor().load_state, crate::artifact::LoadState::Loaded);

        let table = Table::from_numeric(&["a", "b"], vec![vec![3.0, 9.0]]).unwrap();
        assert_eq!(handle.predict(&table).unwrap().raw_values, vec![7.0]);
    }

    #[test]
    fn test_bundle_scaler_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_artifact(
            &dir,
            "bad.json",
            br#"{"model": {"kind": "linear_regression", "coef": [1.0], "intercept": 0.0},
                 "feature_names": ["a"],
                 "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]}}"#,
        );
        assert!(matches!(DecisionModelLoader.load(&descriptor), Err(Error::Load(_))));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let descriptor = ArtifactDescriptor::from_path("/nonexistent/model.json").unwrap();
        assert!(matches!(
            LoaderSet::default().load(&descriptor),
            Err(Error::Load(_))
        ));
    }

    #[test]
    fn test_empty_set_rejects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_artifact(
            &dir,
            "m.json",
            br#"{"kind": "linear_regression", "coef": [1.0], "intercept": 0.0}"#,
        );
        assert!(LoaderSet::empty().load(&descriptor).is_err());
    }

    #[test]
    fn test_corrupt_checkpoint_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_artifact(&dir, "rul.safetensors", b"not a checkpoint");
        assert!(matches!(
            LoaderSet::default().load(&descriptor),
            Err(Error::Load(_))
        ));

        let descriptor = write_artifact(&dir, "rul2.pt", b"not a checkpoint");
        assert!(matches!(
            LoaderSet::default().load(&descriptor),
            Err(Error::Load(_))
        ));
    }
}

//! riskserve Models
//!
//! The model serving registry: loads heterogeneous predictive-maintenance
//! models from a directory and serves them behind one
//! `dispatch(name, table) -> PredictionResponse` contract.
//!
//! - Artifacts are discovered by file suffix (`.json` decision models,
//!   `.safetensors` and `.pt`/`.pth` neural checkpoints)
//! - Each loaded model carries its own feature pipeline, optional scaler
//!   and label map
//! - The dispatcher normalizes output per model family and derives a risk
//!   level for classifiers
//!
//! Neural checkpoints run on CPU with Candle and require the `ml-models`
//! feature (enabled by default).

pub mod artifact;
pub mod bundle;
pub mod decision;
pub mod dispatcher;
pub mod features;
pub mod handle;
pub mod loader;
#[cfg(feature = "ml-models")]
pub mod neural;
pub mod predictor;
pub mod registry;
pub mod risk;
pub mod scaler;

pub use artifact::{ArtifactDescriptor, ArtifactFormat, LoadState};
pub use bundle::{default_label_map, ArtifactBundle, CheckpointConfig, LabelMap};
pub use decision::DecisionModel;
pub use dispatcher::Dispatcher;
pub use features::{FeaturePipeline, Features, SequenceWindows};
pub use handle::ModelHandle;
pub use loader::{ArtifactLoader, DecisionModelLoader, LoaderSet, SafetensorsLoader, TorchLoader};
pub use predictor::{Predictor, PredictorTask};
pub use registry::{LoadSummary, ModelRegistry};
pub use risk::classify_risk;
pub use scaler::StandardScaler;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dispatcher::Dispatcher;
    pub use crate::features::FeaturePipeline;
    pub use crate::handle::ModelHandle;
    pub use crate::predictor::Predictor;
    pub use crate::registry::ModelRegistry;
    pub use riskserve_core::prelude::*;
}

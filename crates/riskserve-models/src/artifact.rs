//! Artifact files discovered on disk

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Serialized format of an artifact, selected by file suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactFormat {
    /// `.json` decision model, bare or bundled
    DecisionModel,
    /// `.safetensors` neural checkpoint with optional embedded config
    NeuralCheckpointA,
    /// `.pt` / `.pth` PyTorch state dict
    NeuralCheckpointB,
}

impl ArtifactFormat {
    /// All recognized suffixes, in scan order
    pub const SUFFIXES: &'static [(&'static str, ArtifactFormat)] = &[
        ("json", ArtifactFormat::DecisionModel),
        ("safetensors", ArtifactFormat::NeuralCheckpointA),
        ("pt", ArtifactFormat::NeuralCheckpointB),
        ("pth", ArtifactFormat::NeuralCheckpointB),
    ];

    /// Format for a path, or `None` for unrecognized suffixes
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| *suffix == ext)
            .map(|(_, format)| *format)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecisionModel => "DECISION_MODEL",
            Self::NeuralCheckpointA => "NEURAL_CHECKPOINT_A",
            Self::NeuralCheckpointB => "NEURAL_CHECKPOINT_B",
        }
    }
}

/// Load lifecycle of one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadState {
    Unloaded,
    Loaded,
    Failed,
}

/// Registry metadata for one artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Registry name (file stem)
    pub name: String,
    pub path: PathBuf,
    pub format: ArtifactFormat,
    pub load_state: LoadState,

    /// Message of the most recent failed load, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ArtifactDescriptor {
    /// Describe a file, or `None` when its suffix or stem is unusable
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let format = ArtifactFormat::from_path(&path)?;
        let name = path.file_stem()?.to_str()?.to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            path,
            format,
            load_state: LoadState::Unloaded,
            last_error: None,
        })
    }

    pub fn mark_loaded(&mut self) {
        self.load_state = LoadState::Loaded;
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, error: impl ToString) {
        self.load_state = LoadState::Failed;
        self.last_error = Some(error.to_string());
    }
}

//! Model registry: discovers artifacts in a directory and serves handles
//!
//! Reads are lock-free snapshots of an immutable name → handle map.
//! `load_all` and `reload` are the only writers; they serialize on one
//! mutex and publish a complete new snapshot (handles and descriptors
//! together) with a single atomic swap, so a reader sees either the old
//! state or the new one, never a partial update.

use crate::artifact::{ArtifactDescriptor, LoadState};
use crate::handle::ModelHandle;
use crate::loader::LoaderSet;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type HandleMap = HashMap<String, Arc<ModelHandle>>;
type DescriptorMap = BTreeMap<String, ArtifactDescriptor>;

/// Loaded handles and artifact metadata, published as one unit
#[derive(Default, Clone)]
struct Snapshot {
    handles: HandleMap,
    descriptors: DescriptorMap,
}

/// Outcome of a directory scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub failed: usize,
    /// Files skipped because an earlier file already registered the name
    pub duplicates: usize,
}

/// Name → model registry backed by an artifact directory
pub struct ModelRegistry {
    model_dir: PathBuf,
    loaders: LoaderSet,
    state: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    ready: AtomicBool,
}

impl ModelRegistry {
    /// Registry over `model_dir` with a loader for every supported format
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self::with_loaders(model_dir, LoaderSet::default())
    }

    pub fn with_loaders(model_dir: impl Into<PathBuf>, loaders: LoaderSet) -> Self {
        Self {
            model_dir: model_dir.into(),
            loaders,
            state: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
            ready: AtomicBool::new(false),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// True once the first `load_all` has finished
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Clear all state and load every artifact in the model directory
    ///
    /// Files are visited in sorted path order. A file that fails to load is
    /// recorded as FAILED and skipped; it never aborts the scan. The first
    /// file that loads claims its name; a later file may replace a FAILED
    /// entry of the same name.
    pub fn load_all(&self) -> LoadSummary {
        let _guard = self.writer.lock();

        let mut next = Snapshot::default();
        let mut summary = LoadSummary::default();

        for path in self.scan() {
            let Some(mut descriptor) = ArtifactDescriptor::from_path(&path) else {
                tracing::debug!(path = %path.display(), "Ignoring file with unrecognized suffix");
                continue;
            };

            if let Some(existing) = next
                .descriptors
                .get(&descriptor.name)
                .filter(|_| next.handles.contains_key(&descriptor.name))
            {
                tracing::warn!(
                    model = %descriptor.name,
                    path = %path.display(),
                    registered = %existing.path.display(),
                    "Skipping artifact: name already registered"
                );
                summary.duplicates += 1;
                continue;
            }

            match self.loaders.load(&descriptor) {
                Ok(handle) => {
                    tracing::info!(
                        model = %descriptor.name,
                        format = descriptor.format.as_str(),
                        family = ?handle.family(),
                        predictor = handle.predictor_kind(),
                        "Loaded model"
                    );
                    descriptor.mark_loaded();
                    next.handles.insert(descriptor.name.clone(), Arc::new(handle));
                    summary.loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        model = %descriptor.name,
                        path = %path.display(),
                        error = %e,
                        "Failed to load artifact, skipping"
                    );
                    metrics::counter!("riskserve_artifact_load_failures_total").increment(1);
                    descriptor.mark_failed(&e);
                    summary.failed += 1;
                }
            }
            next.descriptors.insert(descriptor.name.clone(), descriptor);
        }

        metrics::gauge!("riskserve_models_loaded").set(next.handles.len() as f64);
        self.state.store(Arc::new(next));
        self.ready.store(true, Ordering::Release);

        tracing::info!(
            dir = %self.model_dir.display(),
            loaded = summary.loaded,
            failed = summary.failed,
            "Model registry ready"
        );
        summary
    }

    /// Regular files directly inside the model directory, sorted
    fn scan(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.model_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    dir = %self.model_dir.display(),
                    error = %e,
                    "Model directory unreadable, registry will be empty"
                );
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();
        paths
    }

    /// Re-run the loader for one registered artifact
    ///
    /// On success the handle is replaced atomically. On failure the previous
    /// handle, if any, stays in place and `false` is returned.
    pub fn reload(&self, name: &str) -> bool {
        let _guard = self.writer.lock();

        let mut next = Snapshot::clone(&self.state.load());
        let Some(mut descriptor) = next.descriptors.get(name).cloned() else {
            tracing::warn!(model = %name, "Reload requested for unknown model");
            return false;
        };

        match self.loaders.load(&descriptor) {
            Ok(handle) => {
                next.handles.insert(name.to_string(), Arc::new(handle));
                metrics::gauge!("riskserve_models_loaded").set(next.handles.len() as f64);

                descriptor.mark_loaded();
                next.descriptors.insert(name.to_string(), descriptor);
                self.state.store(Arc::new(next));
                tracing::info!(model = %name, "Reloaded model");
                true
            }
            Err(e) => {
                let kept = next.handles.contains_key(name);
                tracing::warn!(
                    model = %name,
                    error = %e,
                    kept_previous = kept,
                    "Reload failed"
                );
                metrics::counter!("riskserve_artifact_load_failures_total").increment(1);

                if kept {
                    descriptor.load_state = LoadState::Loaded;
                    descriptor.last_error = Some(e.to_string());
                } else {
                    descriptor.mark_failed(&e);
                }
                next.descriptors.insert(name.to_string(), descriptor);
                self.state.store(Arc::new(next));
                false
            }
        }
    }

    /// Loaded handle for `name`
    pub fn get(&self, name: &str) -> Option<Arc<ModelHandle>> {
        self.state.load().handles.get(name).cloned()
    }

    /// Whether an artifact with this name was discovered (loaded or not)
    pub fn contains(&self, name: &str) -> bool {
        self.state.load().descriptors.contains_key(name)
    }

    /// Sorted names of loaded models
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.load().handles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata for every discovered artifact, sorted by name
    pub fn descriptors(&self) -> Vec<ArtifactDescriptor> {
        self.state.load().descriptors.values().cloned().collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<ArtifactDescriptor> {
        self.state.load().descriptors.get(name).cloned()
    }

    /// Number of loaded models
    pub fn len(&self) -> usize {
        self.state.load().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("model_dir", &self.model_dir)
            .field("models", &self.list_names())
            .field("ready", &self.is_ready())
            .finish()
    }
}

//! Shared application state

use crate::config::ServerConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use riskserve_models::{Dispatcher, LoadSummary, ModelRegistry};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Prediction entry point (owns the registry)
    pub dispatcher: Dispatcher,

    /// Prometheus handle for rendering `/metrics`; absent when no recorder
    /// is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        let registry = Arc::new(ModelRegistry::new(&config.model_dir));
        Self {
            config: Arc::new(config),
            dispatcher: Dispatcher::new(registry),
            metrics_handle,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.dispatcher.registry()
    }

    /// Scan the model directory on the blocking pool
    pub async fn load_models(&self) -> anyhow::Result<LoadSummary> {
        let registry = Arc::clone(self.registry());
        let summary = tokio::task::spawn_blocking(move || registry.load_all()).await?;
        Ok(summary)
    }
}

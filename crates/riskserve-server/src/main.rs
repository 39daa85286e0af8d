//! riskserve
//!
//! Serves predictive-maintenance models from a directory of artifacts over
//! HTTP. Models are loaded once at startup and can be reloaded individually
//! on request.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use riskserve_server::{create_router, AppState, ConfigOverrides, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "riskserve")]
#[command(about = "Predictive-maintenance model server", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "riskserve.yaml")]
    config: PathBuf,

    /// Directory containing model artifacts
    #[arg(short, long, env = "RISKSERVE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting riskserve");

    let overrides = ConfigOverrides {
        model_dir: cli.model_dir.clone(),
        listen: cli.listen.clone(),
        port: cli.port,
    };
    let config = ServerConfig::load(&cli.config, &overrides)?;
    info!("Model directory: {}", config.model_dir.display());

    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = config.socket_addr().parse()?;
    let state = AppState::new(config, Some(metrics_handle));

    // registry must be ready before any request is served
    let summary = state.load_models().await?;
    info!(
        loaded = summary.loaded,
        failed = summary.failed,
        "Models: {:?}",
        state.registry().list_names()
    );

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("riskserve=debug,riskserve_models=debug,riskserve_server=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("riskserve=info,riskserve_models=info,riskserve_server=info")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install the Prometheus recorder and describe the registry metrics
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "riskserve_predictions_total",
        "Successful predictions by model"
    );
    metrics::describe_counter!(
        "riskserve_prediction_errors_total",
        "Failed predictions by model and error kind"
    );
    metrics::describe_histogram!(
        "riskserve_prediction_latency_us",
        metrics::Unit::Microseconds,
        "Prediction latency in microseconds by model"
    );
    metrics::describe_gauge!("riskserve_models_loaded", "Models currently loaded");
    metrics::describe_counter!(
        "riskserve_artifact_load_failures_total",
        "Artifacts that failed to load or reload"
    );

    Ok(handle)
}

//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use riskserve_core::{Error, PredictionResponse, Table};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/models", get(list_models))
        .route("/models/details", get(model_details))
        .route("/models/:name/reload", post(reload_model))
        .route("/predict/:name", post(predict))
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "ready": state.registry().is_ready(),
    }))
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "models": state.registry().list_names() }))
}

async fn model_details(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "models": state.registry().descriptors() }))
}

/// True when the request body is CSV text rather than JSON
fn is_csv(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            let mime = value.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("text/csv") || mime.eq_ignore_ascii_case("application/csv")
        })
        .unwrap_or(false)
}

fn parse_table(csv: bool, body: &[u8]) -> Result<Table, Error> {
    if csv {
        Table::from_csv(body)
    } else {
        serde_json::from_slice(body).map_err(|e| Error::invalid_table(e.to_string()))
    }
}

async fn predict(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    let body = body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: rejection.body_text(),
            kind: "payload_too_large",
        },
        _ => Error::invalid_table(rejection.body_text()).into(),
    })?;
    let csv = is_csv(&headers);

    let dispatcher = state.dispatcher.clone();
    let model = name.clone();
    let response = tokio::task::spawn_blocking(move || {
        let table = parse_table(csv, &body)?;
        dispatcher.dispatch(&model, &table)
    })
    .await
    .map_err(|e| AppError::internal(format!("prediction task failed: {}", e)))?;

    match response {
        Ok(response) => Ok(Json(response)),
        Err(e @ Error::UnknownModel { .. }) => Err(AppError::unknown_model(&state, e)),
        Err(e) => {
            warn!(model = %name, kind = e.kind(), "Prediction rejected: {}", e);
            Err(e.into())
        }
    }
}

async fn reload_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.registry().contains(&name) {
        return Err(AppError::unknown_model(&state, Error::unknown_model(&name)));
    }

    let registry = state.registry().clone();
    let model = name.clone();
    let reloaded = tokio::task::spawn_blocking(move || registry.reload(&model))
        .await
        .map_err(|e| AppError::internal(format!("reload task failed: {}", e)))?;

    info!(model = %name, reloaded, "Reload requested");
    Ok(Json(json!({ "model": name, "reloaded": reloaded })))
}

async fn fallback() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: "Not found".to_string(),
        kind: "not_found",
    }
}

/// Error response: `{"error": {"message", "type"}}`
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    kind: &'static str,
}

impl AppError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            kind: "internal_error",
        }
    }

    /// 404 listing the models that are available
    fn unknown_model(state: &AppState, err: Error) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{}. Available: {:?}", err, state.registry().list_names()),
            kind: err.kind(),
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::UnknownModel { .. } => StatusCode::NOT_FOUND,
            Error::InvalidTable(_) | Error::SchemaMismatch { .. } | Error::InsufficientData { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::Inference(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "message": self.message,
                "type": self.kind,
            }
        });

        (self.status, Json(body)).into_response()
    }
}

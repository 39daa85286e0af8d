//! Uniform prediction entry point over the registry

use crate::bundle::UNKNOWN_LABEL;
use crate::registry::ModelRegistry;
use crate::risk::classify_risk;
use riskserve_core::{
    Error, ModelFamily, PredictionItem, PredictionResponse, PredictionResult, Result, Table,
    DEFAULT_UNIT,
};
use std::sync::Arc;
use std::time::Instant;

/// Resolves a model by name, runs it and normalizes the output
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Run `name` on `table` and build the response
    pub fn dispatch(&self, name: &str, table: &Table) -> Result<PredictionResponse> {
        let Some(handle) = self.registry.get(name) else {
            metrics::counter!(
                "riskserve_prediction_errors_total",
                "model" => "unknown",
                "kind" => "unknown_model"
            )
            .increment(1);
            return Err(Error::unknown_model(name));
        };

        let start = Instant::now();
        let result = handle.predict(table).and_then(|r| normalize(name, table, r));
        let elapsed = start.elapsed();

        metrics::histogram!("riskserve_prediction_latency_us", "model" => name.to_string())
            .record(elapsed.as_micros() as f64);

        match &result {
            Ok(response) => {
                metrics::counter!("riskserve_predictions_total", "model" => name.to_string())
                    .increment(1);
                tracing::debug!(
                    model = %name,
                    rows = response.rows,
                    items = response.prediction.len(),
                    risk = ?response.risk_level,
                    latency_us = elapsed.as_micros() as u64,
                    "Prediction complete"
                );
            }
            Err(e) => {
                metrics::counter!(
                    "riskserve_prediction_errors_total",
                    "model" => name.to_string(),
                    "kind" => e.kind()
                )
                .increment(1);
                tracing::debug!(model = %name, error = %e, "Prediction failed");
            }
        }
        result
    }
}

/// Shape a raw result according to its model family
fn normalize(name: &str, table: &Table, result: PredictionResult) -> Result<PredictionResponse> {
    let codes = result.class_codes();
    let labels = result.labels.unwrap_or_default();
    let mut probabilities = result.probabilities.map(Vec::into_iter);
    let mut class_item = |i: usize, code: i64| PredictionItem::Class {
        code,
        label: labels.get(i).cloned().unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
        probabilities: probabilities.as_mut().and_then(Iterator::next),
    };

    let (prediction, risk_level) = match result.family {
        ModelFamily::SingleClass => {
            let code = *codes
                .first()
                .ok_or_else(|| Error::inference("model produced no prediction"))?;
            (vec![class_item(0, code)], Some(classify_risk(&codes[..1])))
        }
        ModelFamily::MultiRowClassification => {
            let items = codes
                .iter()
                .enumerate()
                .map(|(i, code)| class_item(i, *code))
                .collect();
            (items, Some(classify_risk(&codes)))
        }
        ModelFamily::Regression => {
            let unit = result.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string());
            let items = result
                .raw_values
                .iter()
                .map(|value| PredictionItem::Value {
                    value: *value,
                    unit: unit.clone(),
                })
                .collect();
            (items, None)
        }
    };

    let mut summary = format!(
        "Generated {} predictions using '{}'.",
        prediction.len(),
        name
    );
    if let (ModelFamily::SingleClass, Some(PredictionItem::Class { label, .. })) =
        (result.family, prediction.first())
    {
        summary.push_str(&format!(" Predicted class: {}.", label));
    }

    Ok(PredictionResponse {
        model: name.to_string(),
        rows: table.row_count(),
        prediction,
        summary,
        risk_level,
        windows: result.windows,
    })
}

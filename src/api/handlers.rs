use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics::{
    gather_metrics, CROPS_RECOMMENDED_TOTAL, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS,
};
use crate::ml::ServiceStats;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_version: state.service.metadata().version.to_string(),
        uptime_seconds: state.uptime_seconds(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_version: String,
    pub uptime_seconds: u64,
}

/// Soil types accepted by `/predict`
pub async fn soil_types(State(state): State<AppState>) -> Json<SoilTypesResponse> {
    Json(SoilTypesResponse {
        soil_types: state.service.soil_types().to_vec(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SoilTypesResponse {
    pub soil_types: Vec<String>,
}

/// Summary of the model being served
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfoResponse> {
    let metadata = state.service.metadata();
    Json(ModelInfoResponse {
        stats: state.service.stats(),
        crops: state.service.crops().to_vec(),
        test_accuracy: metadata
            .test_metrics
            .get("ensemble")
            .map(|m| m.accuracy),
    })
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    #[serde(flatten)]
    pub stats: ServiceStats,
    pub crops: Vec<String>,
    pub test_accuracy: Option<f64>,
}

/// Recommend a crop for one soil sample
///
/// The body is taken as raw JSON so that presence and type problems are
/// reported with the same messages whatever shape the client sends.
pub async fn predict(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictResponse>> {
    let start = Instant::now();

    let outcome = payload
        .map_err(|rejection| AppError::Prediction(rejection.body_text()))
        .and_then(|Json(body)| state.service.predict_payload(&body));

    PREDICTION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

    match outcome {
        Ok(prediction) => {
            PREDICTIONS_TOTAL.with_label_values(&["success"]).inc();
            CROPS_RECOMMENDED_TOTAL
                .with_label_values(&[&prediction.crop])
                .inc();
            Ok(Json(PredictResponse {
                prediction: prediction.crop,
            }))
        }
        Err(err) => {
            PREDICTIONS_TOTAL
                .with_label_values(&[outcome_label(&err)])
                .inc();
            Err(err)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
}

fn outcome_label(err: &AppError) -> &'static str {
    match err {
        AppError::MissingField(_) => "missing_field",
        AppError::UnseenCategory { .. } => "unseen_category",
        _ => "error",
    }
}

/// Prometheus scrape endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(
            outcome_label(&AppError::MissingField("pH".to_string())),
            "missing_field"
        );
        assert_eq!(
            outcome_label(&AppError::UnseenCategory {
                field: "Soil Type".to_string(),
                value: "Sand".to_string(),
            }),
            "unseen_category"
        );
        assert_eq!(
            outcome_label(&AppError::Prediction("bad".to_string())),
            "error"
        );
    }
}

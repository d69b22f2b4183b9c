use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analytics::{self, rank_importance, Forecast, INSTALLED_CAPACITY_KW, OPTIMAL_OUTPUT_KW};
use crate::ml::features::TARGET_COLUMN;
use crate::ml::{Regressor, SolarFeatures, FEATURE_SPECS};
use super::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Body(#[from] JsonRejection),
    #[error("failed to render page: {0}")]
    Render(#[from] askama::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            ApiError::Body(rejection) => rejection.body_text(),
            other => other.to_string(),
        };
        warn!("Request failed ({}): {}", status, message);
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// === Forecast ===

pub async fn post_forecast(
    State(state): State<AppState>,
    payload: Result<Json<SolarFeatures>, JsonRejection>,
) -> Result<Json<Forecast>, ApiError> {
    let Json(inputs) = payload?;
    if !inputs.is_finite() {
        return Err(ApiError::InvalidInput(
            "all feature values must be finite numbers".to_string(),
        ));
    }

    let forecast = analytics::forecast(state.model.as_ref(), inputs);
    info!(
        "Forecast {}: {:.2} kW ({:.2}% utilization, {})",
        forecast.id,
        forecast.metrics.predicted_kw,
        forecast.metrics.utilization_pct,
        forecast.metrics.plant_status.as_str()
    );
    debug!("Forecast inputs: {:?}", forecast.inputs);
    Ok(Json(forecast))
}

// === Model Endpoints ===

pub async fn get_model_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.model_info())
}

pub async fn get_importance(State(state): State<AppState>) -> impl IntoResponse {
    Json(rank_importance(&state.model.feature_importance()))
}

pub async fn get_schema() -> impl IntoResponse {
    Json(json!({
        "features": FEATURE_SPECS,
        "target": TARGET_COLUMN,
        "defaults": SolarFeatures::default(),
        "capacity_kw": INSTALLED_CAPACITY_KW,
        "optimal_output_kw": [OPTIMAL_OUTPUT_KW.0, OPTIMAL_OUTPUT_KW.1],
    }))
}

// === Health Check ===

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

//! The prediction endpoint behind the SOC estimation form.
//!
//! Stateless between requests: every call re-validates the texture gate,
//! obtains remote features (from the request body when the form already
//! fetched them, live otherwise), assembles the model input row, and scores.
//! Texture failures block with a 422 before any remote call or model
//! invocation; a schema mismatch between the assembled row and the model is
//! a deployment fault and maps to 500 with the offending columns named.

use std::collections::BTreeMap;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::climate;
use crate::features::{self, FeatureInput};
use crate::indices::{self, ExtractionPolicy, Sensor};
use crate::model::PredictError;
use crate::models::{ClimateSummary, IndexStats, LandCover, Texture};
use crate::routes::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/predict", post(handler))
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    // ---
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
    pub sand: f64,
    pub silt: f64,
    pub clay: f64,
    pub land_cover: LandCover,
    pub vegetation: String,
    #[serde(default)]
    pub sensor: Option<Sensor>,
    /// Pre-fetched index statistics; fetched live when absent.
    #[serde(default)]
    pub index_stats: Option<IndexStats>,
    /// Pre-fetched climate summary; fetched live when absent.
    #[serde(default)]
    pub climate: Option<ClimateSummary>,
}

#[derive(Serialize)]
struct PredictResponse {
    // ---
    soc_percent: f64,
    features: BTreeMap<String, f64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    // ---
    error: String,
}

async fn handler(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> impl IntoResponse {
    // ---
    info!("POST /predict ({}, {})", req.lat, req.lon);

    // Step 1: texture gate, before anything expensive happens
    let texture = Texture {
        sand: req.sand,
        silt: req.silt,
        clay: req.clay,
    };
    if !texture.is_valid() {
        let err = PredictError::InvalidTexture(texture.sum());
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response();
    }

    // Step 2: remote features, body-supplied or fetched live
    let today = Utc::now().date_naive();
    let index_stats = match req.index_stats {
        Some(stats) => stats,
        None => {
            let policy = ExtractionPolicy::for_sensor(req.sensor.unwrap_or(Sensor::Sentinel2));
            let series =
                indices::fetch_index_series(&state.gee, &policy, req.lat, req.lon, today).await;
            indices::series_stats(&series)
        }
    };
    let climate = match req.climate {
        Some(summary) => summary,
        None => climate::fetch_climate_summary(&state.gee, req.lat, req.lon, today).await,
    };

    // Step 3: assemble, validate against the training schema, score
    let input = FeatureInput {
        elevation: req.elevation,
        texture,
        land_cover: req.land_cover,
        vegetation: req.vegetation,
        index_stats,
        climate,
    };
    let row = features::assemble(&input, &state.encodings);

    match state.model.predict(&row) {
        Ok(soc) => {
            let soc_percent = (soc * 100.0).round() / 100.0;
            info!("POST /predict - SOC estimate {:.2}%", soc_percent);
            (
                StatusCode::OK,
                Json(PredictResponse {
                    soc_percent,
                    features: row,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("prediction failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

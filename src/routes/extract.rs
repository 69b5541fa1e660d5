//! Raw feature-extraction endpoints, the JSON counterpart of the original
//! fetch-data form buttons: an index series with its aggregate statistics,
//! and the climate summary, for one coordinate.

use axum::{
    extract::Query, extract::State, response::IntoResponse, routing::get, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::climate;
use crate::indices::{self, Cadence, ExtractionPolicy, Sensor};
use crate::models::{ClimateSummary, IndexRecord, IndexStats};
use crate::routes::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/indices", get(indices_handler))
        .route("/climate", get(climate_handler))
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    // ---
    lat: f64,
    lon: f64,
    #[serde(default)]
    sensor: Option<Sensor>,
    #[serde(default)]
    cadence: Option<Cadence>,
}

#[derive(Serialize)]
struct IndicesResponse {
    // ---
    series: Vec<IndexRecord>,
    stats: IndexStats,
}

async fn indices_handler(
    Query(params): Query<ExtractQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // ---
    info!("GET /indices ({}, {})", params.lat, params.lon);

    let mut policy = ExtractionPolicy::for_sensor(params.sensor.unwrap_or(Sensor::Sentinel2));
    if let Some(cadence) = params.cadence {
        policy.cadence = cadence;
    }

    let today = Utc::now().date_naive();
    let series =
        indices::fetch_index_series(&state.gee, &policy, params.lat, params.lon, today).await;
    let stats = indices::series_stats(&series);

    info!(
        "GET /indices - {} windows, {} with data",
        series.len(),
        series.iter().filter(|r| !r.is_empty()).count()
    );
    Json(IndicesResponse { series, stats })
}

async fn climate_handler(
    Query(params): Query<ExtractQuery>,
    State(state): State<AppState>,
) -> Json<ClimateSummary> {
    // ---
    info!("GET /climate ({}, {})", params.lat, params.lon);

    let today = Utc::now().date_naive();
    let summary =
        climate::fetch_climate_summary(&state.gee, params.lat, params.lon, today).await;
    Json(summary)
}

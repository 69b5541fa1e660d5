//! Quarterly batch exports of index composites for the full sample set.
//!
//! One export job per quarter: every sample point becomes a feature, the
//! quarter's masked Landsat composite is reduced over a 30 m buffer around
//! each one, and the resulting table is shipped server-side to a Drive
//! folder. Jobs are submitted in batches of two quarters with a manual
//! Enter prompt between batches; the platform caps concurrent exports and
//! the operator watches the folder rather than this process polling.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Months, NaiveDate, Utc};
use serde_json::json;
use tracing::info;

use crate::elevation::sniff_delimiter;
use crate::gee::{expression as ex, EeClient};
use crate::indices::{cloud_mask_lambda, index_bands_lambda, quarter_starts, Sensor};
use crate::models::SamplePoint;
use crate::Config;

// ---

const CLOUD_PROPERTY: &str = "CLOUD_COVER_LAND";
const CLOUD_THRESHOLD: f64 = 80.0;
const BUFFER_M: f64 = 30.0;
const SCALE_M: f64 = 30.0;
const BATCH_SIZE: usize = 2;

/// Load the sample-point table backing the exports.
pub fn load_points(path: &Path) -> Result<Vec<SamplePoint>> {
    // ---
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(&raw))
        .from_reader(raw.as_bytes());

    let mut points = Vec::new();
    for record in reader.deserialize() {
        points.push(record?);
    }
    Ok(points)
}

/// Submit quarterly export jobs from `start` through the latest sample date,
/// two quarters at a time, pausing for Enter between batches.
pub async fn run_quarterly_exports(
    client: &EeClient,
    config: &Config,
    csv_path: &Path,
    start: NaiveDate,
) -> Result<()> {
    // ---
    let points = load_points(csv_path)?;
    if points.is_empty() {
        anyhow::bail!("{} contains no sample points", csv_path.display());
    }

    let end = latest_sample_date(&points).unwrap_or_else(|| Utc::now().date_naive());
    let quarters = quarter_starts(start, end);
    info!(
        "{} points, {} quarters from {} to {}",
        points.len(),
        quarters.len(),
        start,
        end
    );

    for (batch_no, batch) in quarters.chunks(BATCH_SIZE).enumerate() {
        for quarter in batch {
            let table = quarter_table(&points, *quarter);
            let tag = quarter.format("%Y_%m").to_string();
            let operation = client
                .export_table(
                    table,
                    &format!("export_all_locations_{}", tag),
                    &format!("output_all_locations_{}", tag),
                    &config.export_folder,
                )
                .await?;
            let state = client.operation_state(&operation).await?;
            println!("Started export for quarter {}: {} ({})", quarter, operation, state);
        }

        let remaining = quarters.len().saturating_sub((batch_no + 1) * BATCH_SIZE);
        if remaining > 0 {
            print!("Press Enter after the current batch of two quarters completes to continue... ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
        }
    }

    Ok(())
}

fn latest_sample_date(points: &[SamplePoint]) -> Option<NaiveDate> {
    // ---
    points
        .iter()
        .filter_map(|p| NaiveDate::parse_from_str(&p.sample_date, "%Y-%m-%d").ok())
        .max()
}

/// Server-side table for one quarter: each point annotated with the mean of
/// the masked, index-banded composite over its buffer.
fn quarter_table(points: &[SamplePoint], quarter: NaiveDate) -> serde_json::Value {
    // ---
    let features: Vec<serde_json::Value> = points
        .iter()
        .map(|p| {
            ex::feature(
                ex::point(p.long, p.lat),
                json!({
                    "sample_date": p.sample_date,
                    "lat": p.lat,
                    "long": p.long,
                }),
            )
        })
        .collect();
    let fc = ex::feature_collection(ex::array(features));

    let quarter_end = quarter + Months::new(3) - Duration::days(1);
    let landsat = ex::filter_metadata_lt(
        ex::filter_bounds(
            ex::filter_date(
                ex::image_collection(Sensor::Landsat8.collection_id()),
                &quarter.format("%Y-%m-%d").to_string(),
                &quarter_end.format("%Y-%m-%d").to_string(),
            ),
            ex::collection_geometry(fc.clone()),
        ),
        CLOUD_PROPERTY,
        CLOUD_THRESHOLD,
    );
    let indexed = ex::map_collection(
        ex::map_collection(landsat, cloud_mask_lambda(Sensor::Landsat8)),
        index_bands_lambda(Sensor::Landsat8),
    );
    let composite = ex::select(
        ex::mean_composite(indexed),
        &["NDVI", "NDMI", "BSI", "SOCI"],
    );

    let annotate = ex::lambda(
        "f",
        ex::feature_set_properties(
            ex::arg_ref("f"),
            ex::reduce_region_mean(
                composite,
                ex::buffer(ex::feature_geometry(ex::arg_ref("f")), BUFFER_M),
                SCALE_M,
            ),
        ),
    );

    ex::map_collection(fc, annotate)
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn point(lat: f64, long: f64, date: &str) -> SamplePoint {
        SamplePoint {
            lat,
            long,
            sample_date: date.to_string(),
        }
    }

    #[test]
    fn latest_sample_date_ignores_unparseable_rows() {
        // ---
        let points = vec![
            point(54.8, 8.4, "2018-05-02"),
            point(48.1, 11.5, "not-a-date"),
            point(52.5, 13.4, "2018-09-14"),
        ];
        assert_eq!(
            latest_sample_date(&points),
            NaiveDate::from_ymd_opt(2018, 9, 14)
        );
    }

    #[test]
    fn quarter_table_reduces_each_feature_over_its_buffer() {
        // ---
        let points = vec![point(54.8599, 8.4114, "2018-05-02")];
        let table = quarter_table(&points, NaiveDate::from_ymd_opt(2018, 4, 1).unwrap());
        let text = table.to_string();

        assert!(text.contains("CLOUD_COVER_LAND"));
        assert!(text.contains("Feature.setMulti"));
        assert!(text.contains("Image.reduceRegion"));
        assert!(text.contains("2018-04-01"));
        assert!(text.contains("2018-06-30"));
        assert!(text.contains("sample_date"));
    }
}

//! Elevation backfill for sample-point CSVs.
//!
//! Rows with an empty elevation cell are looked up against the primary SRTM
//! raster (mean over a 100 m buffer at 30 m scale) with an ALOS DSM median
//! composite as fallback, rounded to the nearest meter, and written back in
//! place. Populated cells are never touched, so re-running on a previously
//! backfilled file is a no-op. The survey CSVs are not standardized on one
//! delimiter, so it is sniffed from the header and preserved on rewrite.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use serde_json::Value;
use tracing::{info, warn};

use crate::gee::{expression as ex, EeClient};

// ---

const PRIMARY_DATASET: &str = "CGIAR/SRTM90_V4";
const FALLBACK_DATASET: &str = "JAXA/ALOS/AW3D30/V3_2";
const BUFFER_M: f64 = 100.0;
const SCALE_M: f64 = 30.0;

/// Outcome counts for one backfill run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    // ---
    pub total: usize,
    pub missing: usize,
    pub filled: usize,
}

/// Fill missing elevation cells of `path` in place.
///
/// Per-point lookup failures are logged and leave the cell empty; the batch
/// always runs to completion. The file is rewritten once at the end, and only
/// when at least one cell was filled.
pub async fn backfill_elevation(client: &EeClient, path: &Path) -> Result<BackfillReport> {
    // ---
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let delimiter = sniff_delimiter(&raw);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(raw.as_bytes());
    let headers = reader.headers()?.clone();

    let lat_idx = find_column(&headers, &["lat", "latitude"])?;
    let lon_idx = find_column(&headers, &["long", "lon", "longitude"])?;
    let elev_idx = find_column(&headers, &["elevation"])?;

    let mut records: Vec<StringRecord> = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }

    let mut report = BackfillReport {
        total: records.len(),
        missing: 0,
        filled: 0,
    };

    for (row, record) in records.iter_mut().enumerate() {
        if !needs_elevation(record.get(elev_idx)) {
            continue;
        }
        report.missing += 1;

        let lat: f64 = match record.get(lat_idx).unwrap_or("").trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("row {}: unparseable latitude, skipping", row);
                continue;
            }
        };
        let lon: f64 = match record.get(lon_idx).unwrap_or("").trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("row {}: unparseable longitude, skipping", row);
                continue;
            }
        };

        if let Some(elevation) = lookup_elevation(client, lat, lon).await {
            set_cell(record, elev_idx, elevation.to_string());
            report.filled += 1;
            info!("row {}: elevation {} for ({}, {})", row, elevation, lat, lon);
        } else {
            warn!("row {}: could not retrieve elevation for ({}, {})", row, lat, lon);
        }
    }

    if report.filled == 0 {
        info!(
            "backfill complete: {} rows, {} missing, none filled; file left untouched",
            report.total, report.missing
        );
        return Ok(report);
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(&headers)?;
    for record in &records {
        writer.write_record(record)?;
    }
    let output = writer.into_inner().context("csv writer flush failed")?;
    fs::write(path, output).with_context(|| format!("failed to rewrite {}", path.display()))?;

    info!(
        "backfill complete: {} rows, {} missing, {} filled",
        report.total, report.missing, report.filled
    );
    Ok(report)
}

/// Primary raster first, fallback only when the primary reduction is null.
/// Any remote error degrades to "still missing".
async fn lookup_elevation(client: &EeClient, lat: f64, lon: f64) -> Option<i32> {
    // ---
    let geometry = ex::buffer(ex::point(lon, lat), BUFFER_M);

    let primary = client
        .reduce_region_mean(ex::image(PRIMARY_DATASET), geometry.clone(), SCALE_M)
        .await;

    let value = match primary {
        Ok(bands) => match first_band(&bands) {
            Some(v) => Some(v),
            None => {
                match client
                    .reduce_region_mean(fallback_expression(), geometry, SCALE_M)
                    .await
                {
                    Ok(bands) => first_band(&bands),
                    Err(e) => {
                        warn!("fallback lookup failed for ({}, {}): {}", lat, lon, e);
                        None
                    }
                }
            }
        },
        Err(e) => {
            warn!("primary lookup failed for ({}, {}): {}", lat, lon, e);
            None
        }
    };

    value.map(|v| v.round() as i32)
}

/// Median DSM composite of the ALOS archive. The asset also carries MSK and
/// STK mask bands; only the elevation band may reach `first_band`.
fn fallback_expression() -> Value {
    // ---
    ex::select(
        ex::median_composite(ex::image_collection(FALLBACK_DATASET)),
        &["DSM_median"],
    )
}

/// First non-null band value of a single-band reduction, whatever the
/// reducer named the band.
fn first_band(bands: &std::collections::BTreeMap<String, Option<f64>>) -> Option<f64> {
    bands.values().find_map(|v| *v)
}

/// A cell is missing when it is absent or holds only whitespace.
pub fn needs_elevation(cell: Option<&str>) -> bool {
    match cell {
        None => true,
        Some(s) => s.trim().is_empty(),
    }
}

/// The survey exports use either comma or semicolon; decide from the header.
pub fn sniff_delimiter(raw: &str) -> u8 {
    let header = raw.lines().next().unwrap_or("");
    if header.contains(';') {
        b';'
    } else {
        b','
    }
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Result<usize> {
    // ---
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        .ok_or_else(|| anyhow!("CSV is missing a {:?} column", names[0]))
}

fn set_cell(record: &mut StringRecord, idx: usize, value: String) {
    // ---
    let mut fields: Vec<String> = record.iter().map(String::from).collect();
    if idx < fields.len() {
        fields[idx] = value;
    }
    *record = StringRecord::from(fields);
}

// ---

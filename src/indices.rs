//! Vegetation-index extraction.
//!
//! For each time window, a server-side recipe filters the sensor's image
//! archive by date, bounds, and scene cloud cover, masks per-pixel cloud and
//! shadow flags, adds the four band-ratio indices, composites the survivors
//! (temporal mean), and reduces spatially (mean over a small buffer around
//! the point). Windows with zero qualifying images yield an all-null record
//! rather than an error, and so do transient per-window failures.
//!
//! The original scripts hardcoded divergent policy constants per variant;
//! here they live in [`ExtractionPolicy`] with per-sensor defaults matching
//! the richest variant of each.

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde_json::Value;
use tracing::{debug, warn};

use crate::gee::{expression as ex, EeClient};
use crate::models::{IndexRecord, IndexStats, TimeWindow};

// ---

/// Satellite archive the indices are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    /// 10 m resolution, 5-day revisit, archive starts 2015.
    Sentinel2,
    /// 30 m resolution, 16-day revisit, archive reaches back to the 1980s.
    Landsat8,
}

impl Sensor {
    // ---
    pub fn collection_id(&self) -> &'static str {
        match self {
            Sensor::Sentinel2 => "COPERNICUS/S2_SR",
            Sensor::Landsat8 => "LANDSAT/LC08/C02/T1_L2",
        }
    }

    /// Scene-level cloud cover property used for the threshold filter.
    pub fn cloud_property(&self) -> &'static str {
        match self {
            Sensor::Sentinel2 => "CLOUDY_PIXEL_PERCENTAGE",
            Sensor::Landsat8 => "CLOUD_COVER",
        }
    }

    fn bands(&self) -> SensorBands {
        match self {
            Sensor::Sentinel2 => SensorBands {
                blue: "B2",
                green: "B3",
                red: "B4",
                nir: "B8",
                swir1: "B11",
            },
            Sensor::Landsat8 => SensorBands {
                blue: "SR_B2",
                green: "SR_B3",
                red: "SR_B4",
                nir: "SR_B5",
                swir1: "SR_B6",
            },
        }
    }
}

struct SensorBands {
    // ---
    blue: &'static str,
    green: &'static str,
    red: &'static str,
    nir: &'static str,
    swir1: &'static str,
}

/// How windows are laid out over the lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// One window per month start, widened ±15 days.
    Monthly,
    /// One 15-day window around the middle of each quarter.
    Quarterly,
}

/// Policy knobs that varied across the original script versions.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionPolicy {
    // ---
    pub sensor: Sensor,
    pub cadence: Cadence,
    pub lookback_years: u32,
    /// Scenes above this cloud-cover percentage are discarded outright.
    pub cloud_threshold: f64,
    /// Buffer radius in meters around the point for the spatial reduction.
    pub buffer_m: f64,
    /// Reduction scale in meters.
    pub scale_m: f64,
}

impl ExtractionPolicy {
    // ---
    pub fn for_sensor(sensor: Sensor) -> Self {
        match sensor {
            Sensor::Sentinel2 => ExtractionPolicy {
                sensor,
                cadence: Cadence::Monthly,
                lookback_years: 3,
                cloud_threshold: 60.0,
                buffer_m: 60.0,
                scale_m: 10.0,
            },
            Sensor::Landsat8 => ExtractionPolicy {
                sensor,
                cadence: Cadence::Quarterly,
                lookback_years: 5,
                cloud_threshold: 80.0,
                buffer_m: 30.0,
                scale_m: 30.0,
            },
        }
    }
}

// --- window generation ---

/// Last day of the most recent full month before `today`.
pub fn last_full_month_end(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today) - Duration::days(1)
}

/// Time windows for one policy, oldest first.
pub fn windows(policy: &ExtractionPolicy, today: NaiveDate) -> Vec<TimeWindow> {
    // ---
    let end = last_full_month_end(today);
    let start = end - Duration::days(i64::from(policy.lookback_years) * 365);

    match policy.cadence {
        Cadence::Monthly => month_starts(start, end)
            .into_iter()
            .map(|month| TimeWindow {
                start: month - Duration::days(15),
                end: month + Months::new(1) + Duration::days(14),
                period: month,
            })
            .collect(),
        Cadence::Quarterly => quarter_starts(start, end)
            .into_iter()
            .map(|quarter| {
                // roughly the middle of the quarter
                let target = quarter + Months::new(1) + Duration::days(15);
                TimeWindow {
                    start: target,
                    end: target + Duration::days(15),
                    period: quarter,
                }
            })
            .collect(),
    }
}

fn month_starts(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    // ---
    let mut cursor = NaiveDate::from_ymd_opt(start.year(), start.month(), 1).unwrap_or(start);
    if cursor < start {
        cursor = cursor + Months::new(1);
    }
    let mut months = Vec::new();
    while cursor <= end {
        months.push(cursor);
        cursor = cursor + Months::new(1);
    }
    months
}

pub(crate) fn quarter_starts(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    // ---
    let quarter_month = ((start.month() - 1) / 3) * 3 + 1;
    let mut cursor = NaiveDate::from_ymd_opt(start.year(), quarter_month, 1).unwrap_or(start);
    if cursor < start {
        cursor = cursor + Months::new(3);
    }
    let mut quarters = Vec::new();
    while cursor <= end {
        quarters.push(cursor);
        cursor = cursor + Months::new(3);
    }
    quarters
}

// --- server-side recipe ---

/// Per-pixel cloud/shadow keep-mask for the sensor, as a mapped lambda.
pub(crate) fn cloud_mask_lambda(sensor: Sensor) -> Value {
    // ---
    match sensor {
        Sensor::Sentinel2 => {
            // SCL classes kept: 3, 4 vegetation, 5 bare soil, 6 water
            let scl = ex::select(ex::arg_ref("img"), &["SCL"]);
            let keep = ex::or(
                ex::or(ex::eq_const(scl.clone(), 3.0), ex::eq_const(scl.clone(), 4.0)),
                ex::or(ex::eq_const(scl.clone(), 5.0), ex::eq_const(scl, 6.0)),
            );
            ex::lambda("img", ex::update_mask(ex::arg_ref("img"), keep))
        }
        Sensor::Landsat8 => {
            // QA_PIXEL bits 3 (cloud) and 4 (cloud shadow) must both be clear
            let qa = ex::select(ex::arg_ref("img"), &["QA_PIXEL"]);
            let clear = ex::and(
                ex::eq_const(ex::bitwise_and_const(qa.clone(), 1 << 3), 0.0),
                ex::eq_const(ex::bitwise_and_const(qa, 1 << 4), 0.0),
            );
            ex::lambda("img", ex::update_mask(ex::arg_ref("img"), clear))
        }
    }
}

/// Lambda adding the NDVI/NDMI/BSI/SOCI bands to each image.
pub(crate) fn index_bands_lambda(sensor: Sensor) -> Value {
    // ---
    let b = sensor.bands();
    let img = || ex::arg_ref("img");
    let band = |name: &str| ex::select(ex::arg_ref("img"), &[name]);

    let ndvi = ex::rename(ex::normalized_difference(img(), b.nir, b.red), "NDVI");
    let ndmi = ex::rename(ex::normalized_difference(img(), b.nir, b.swir1), "NDMI");

    // ((SWIR1 + Red) - (NIR + Blue)) / ((SWIR1 + Red) + (NIR + Blue))
    let swir_red = ex::add(band(b.swir1), band(b.red));
    let nir_blue = ex::add(band(b.nir), band(b.blue));
    let bsi = ex::rename(
        ex::divide(
            ex::subtract(swir_red.clone(), nir_blue.clone()),
            ex::add(swir_red, nir_blue),
        ),
        "BSI",
    );

    // Blue / (Green * Red)
    let soci = ex::rename(
        ex::divide(band(b.blue), ex::multiply(band(b.green), band(b.red))),
        "SOCI",
    );

    let with_indices = ex::add_bands(
        ex::add_bands(ex::add_bands(ex::add_bands(img(), ndvi), ndmi), bsi),
        soci,
    );
    ex::lambda("img", with_indices)
}

/// Filtered, masked, index-banded collection for one (point, window) pair.
fn indexed_collection(policy: &ExtractionPolicy, lat: f64, lon: f64, window: &TimeWindow) -> Value {
    // ---
    let filtered = ex::filter_metadata_lt(
        ex::filter_bounds(
            ex::filter_date(
                ex::image_collection(policy.sensor.collection_id()),
                &window.start.format("%Y-%m-%d").to_string(),
                &window.end.format("%Y-%m-%d").to_string(),
            ),
            ex::point(lon, lat),
        ),
        policy.sensor.cloud_property(),
        policy.cloud_threshold,
    );

    ex::map_collection(
        ex::map_collection(filtered, cloud_mask_lambda(policy.sensor)),
        index_bands_lambda(policy.sensor),
    )
}

// --- extraction loop ---

/// Fetch one record per window for a point, sequentially. A window with no
/// qualifying images, or one whose query fails transiently, degrades to the
/// all-null record; the loop never aborts mid-series.
pub async fn fetch_index_series(
    client: &EeClient,
    policy: &ExtractionPolicy,
    lat: f64,
    lon: f64,
    today: NaiveDate,
) -> Vec<IndexRecord> {
    // ---
    let windows = windows(policy, today);
    let mut records = Vec::with_capacity(windows.len());

    for window in &windows {
        records.push(fetch_window(client, policy, lat, lon, window).await);
    }

    records
}

async fn fetch_window(
    client: &EeClient,
    policy: &ExtractionPolicy,
    lat: f64,
    lon: f64,
    window: &TimeWindow,
) -> IndexRecord {
    // ---
    let date = window.label();
    let collection = indexed_collection(policy, lat, lon, window);

    let size = match client.collection_size(collection.clone()).await {
        Ok(n) => n,
        Err(e) => {
            warn!("size query failed for ({}, {}) at {}: {}", lat, lon, date, e);
            return IndexRecord::empty(date);
        }
    };

    if size == 0 {
        debug!("no qualifying images for ({}, {}) at {}", lat, lon, date);
        return IndexRecord::empty(date);
    }

    let composite = ex::select(
        ex::mean_composite(collection),
        &["NDVI", "NDMI", "BSI", "SOCI"],
    );
    let geometry = ex::buffer(ex::point(lon, lat), policy.buffer_m);

    match client
        .reduce_region_mean(composite, geometry, policy.scale_m)
        .await
    {
        Ok(bands) => IndexRecord {
            ndvi: bands.get("NDVI").copied().flatten(),
            ndmi: bands.get("NDMI").copied().flatten(),
            bsi: bands.get("BSI").copied().flatten(),
            soci: bands.get("SOCI").copied().flatten(),
            date,
        },
        Err(e) => {
            warn!("reduction failed for ({}, {}) at {}: {}", lat, lon, date, e);
            IndexRecord::empty(date)
        }
    }
}

// --- aggregation ---

/// Mean, sample standard deviation, and least-squares trend slope of each
/// index over the valid entries of a series.
pub fn series_stats(records: &[IndexRecord]) -> IndexStats {
    // ---
    let ndvi: Vec<f64> = records.iter().filter_map(|r| r.ndvi).collect();
    let ndmi: Vec<f64> = records.iter().filter_map(|r| r.ndmi).collect();
    let bsi: Vec<f64> = records.iter().filter_map(|r| r.bsi).collect();
    let soci: Vec<f64> = records.iter().filter_map(|r| r.soci).collect();

    IndexStats {
        ndvi_mean: mean(&ndvi),
        ndvi_std: sample_std(&ndvi),
        ndvi_trend: trend_slope(&ndvi),
        ndmi_mean: mean(&ndmi),
        ndmi_std: sample_std(&ndmi),
        ndmi_trend: trend_slope(&ndmi),
        bsi_mean: mean(&bsi),
        bsi_std: sample_std(&bsi),
        bsi_trend: trend_slope(&bsi),
        soci_mean: mean(&soci),
        soci_std: sample_std(&soci),
        soci_trend: trend_slope(&soci),
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    // ---
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Two-pass sample standard deviation (ddof = 1). None for fewer than two
/// values, matching the aggregation the model was trained against.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    // ---
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Least-squares slope of values against their position in the valid series.
pub fn trend_slope(values: &[f64]) -> Option<f64> {
    // ---
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values)?;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }
    Some(cov / var)
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn monthly_windows_are_widened_by_fifteen_days() {
        // ---
        let policy = ExtractionPolicy::for_sensor(Sensor::Sentinel2);
        let all = windows(&policy, day(2024, 6, 10));

        // Lookback ends at the last full month; records carry its start date
        assert_eq!(all.last().unwrap().label(), "2024-05-01");
        for w in &all {
            // month start minus 15 days .. month start + 1 month + 14 days
            assert_eq!(w.period.day(), 1);
            assert_eq!(w.start, w.period - Duration::days(15));
            assert_eq!(w.end, w.period + Months::new(1) + Duration::days(14));
        }
        // 3-year lookback covers roughly 36 months
        assert!((35..=37).contains(&all.len()), "got {} windows", all.len());
    }

    #[test]
    fn quarterly_windows_are_fifteen_days_mid_quarter() {
        // ---
        let policy = ExtractionPolicy::for_sensor(Sensor::Landsat8);
        let all = windows(&policy, day(2024, 6, 10));

        // Records are labeled with the quarter start, not the filter start
        assert_eq!(all.last().unwrap().label(), "2024-04-01");
        for w in &all {
            assert_eq!(w.end - w.start, Duration::days(15));
            // the filter window starts 1 month + 15 days into the quarter
            assert_eq!(w.period.day(), 1);
            assert!(matches!(w.period.month(), 1 | 4 | 7 | 10));
            assert_eq!(w.start, w.period + Months::new(1) + Duration::days(15));
        }
        // 5-year lookback covers roughly 20 quarters
        assert!((19..=21).contains(&all.len()), "got {} windows", all.len());
    }

    #[test]
    fn stats_skip_null_entries() {
        // ---
        let records = vec![
            IndexRecord {
                date: "2023-01-01".into(),
                ndvi: Some(0.2),
                ndmi: None,
                bsi: None,
                soci: None,
            },
            IndexRecord::empty("2023-02-01".into()),
            IndexRecord {
                date: "2023-03-01".into(),
                ndvi: Some(0.4),
                ndmi: None,
                bsi: None,
                soci: None,
            },
            IndexRecord {
                date: "2023-04-01".into(),
                ndvi: Some(0.6),
                ndmi: Some(0.1),
                bsi: None,
                soci: None,
            },
        ];

        let stats = series_stats(&records);
        assert!((stats.ndvi_mean.unwrap() - 0.4).abs() < 1e-12);
        // valid entries are equally spaced, slope is the step
        assert!((stats.ndvi_trend.unwrap() - 0.2).abs() < 1e-12);
        // a single NDMI value has a mean but no spread or trend
        assert_eq!(stats.ndmi_mean, Some(0.1));
        assert_eq!(stats.ndmi_std, None);
        assert_eq!(stats.ndmi_trend, None);
        assert_eq!(stats.bsi_mean, None);
    }

    #[test]
    fn stats_of_empty_series_are_all_none() {
        // ---
        let stats = series_stats(&[]);
        assert_eq!(stats.ndvi_mean, None);
        assert_eq!(stats.soci_trend, None);
    }

    #[test]
    fn sample_std_matches_hand_computation() {
        // ---
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // sum of squared deviations from mean 5.0 is 32; 32/7 sqrt
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((sample_std(&values).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn trend_of_linear_series_is_its_slope() {
        // ---
        let values = [1.0, 3.0, 5.0, 7.0];
        assert!((trend_slope(&values).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(trend_slope(&[1.0]), None);
    }

    #[test]
    fn sentinel2_recipe_filters_on_cloudy_pixel_percentage() {
        // ---
        let policy = ExtractionPolicy::for_sensor(Sensor::Sentinel2);
        let w = TimeWindow {
            start: day(2023, 3, 17),
            end: day(2023, 5, 15),
            period: day(2023, 4, 1),
        };
        let col = indexed_collection(&policy, 54.8599, 8.4114, &w);
        let text = col.to_string();
        assert!(text.contains("CLOUDY_PIXEL_PERCENTAGE"));
        assert!(text.contains("COPERNICUS/S2_SR"));
        assert!(text.contains("SCL"));
        assert!(text.contains("2023-03-17"));
    }

    #[test]
    fn landsat_recipe_masks_qa_pixel_bits() {
        // ---
        let policy = ExtractionPolicy::for_sensor(Sensor::Landsat8);
        let w = TimeWindow {
            start: day(2023, 2, 15),
            end: day(2023, 3, 2),
            period: day(2023, 1, 1),
        };
        let col = indexed_collection(&policy, 48.1, 11.5, &w);
        let text = col.to_string();
        assert!(text.contains("QA_PIXEL"));
        assert!(text.contains("Image.bitwiseAnd"));
        assert!(text.contains("LANDSAT/LC08/C02/T1_L2"));
        // all four index bands are added
        for band in ["NDVI", "NDMI", "BSI", "SOCI"] {
            assert!(text.contains(band), "missing {}", band);
        }
    }
}

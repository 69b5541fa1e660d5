//! Climate aggregation from the TerraClimate monthly archive.
//!
//! One point reduction per month over the lookback: precipitation plus the
//! min/max temperature pair, averaged into a monthly mean temperature. No
//! interpolation; a month with a null precipitation value counts as zero and
//! a month missing either temperature bound is skipped, both matching the
//! data the model was trained against.

use chrono::{Datelike, Duration, Months, NaiveDate};
use tracing::warn;

use crate::gee::{expression as ex, EeClient};
use crate::indices::{last_full_month_end, mean};
use crate::models::ClimateSummary;

// ---

const COLLECTION: &str = "IDAHO_EPSCOR/TERRACLIMATE";
const SCALE_M: f64 = 4000.0;
const LOOKBACK_YEARS: i64 = 5;

/// Raw monthly values for one point.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthlyClimate {
    // ---
    pub precip: Option<f64>,
    pub tmin: Option<f64>,
    pub tmax: Option<f64>,
}

/// Fetch and aggregate the climate record for a point. Per-month query
/// failures are logged and treated as missing months; the loop continues.
pub async fn fetch_climate_summary(
    client: &EeClient,
    lat: f64,
    lon: f64,
    today: NaiveDate,
) -> ClimateSummary {
    // ---
    let end = last_full_month_end(today);
    let start = end - Duration::days(LOOKBACK_YEARS * 365);

    let mut months = Vec::new();
    let mut cursor = NaiveDate::from_ymd_opt(start.year(), start.month(), 1).unwrap_or(start);
    while cursor <= end {
        months.push(fetch_month(client, lat, lon, cursor).await);
        cursor = cursor + Months::new(1);
    }

    aggregate(&months)
}

async fn fetch_month(client: &EeClient, lat: f64, lon: f64, month: NaiveDate) -> MonthlyClimate {
    // ---
    let window_end = month + Months::new(1);
    let composite = ex::select(
        ex::mean_composite(ex::filter_bounds(
            ex::filter_date(
                ex::image_collection(COLLECTION),
                &month.format("%Y-%m-%d").to_string(),
                &window_end.format("%Y-%m-%d").to_string(),
            ),
            ex::point(lon, lat),
        )),
        &["pr", "tmmn", "tmmx"],
    );

    match client
        .reduce_region_mean(composite, ex::point(lon, lat), SCALE_M)
        .await
    {
        Ok(bands) => MonthlyClimate {
            precip: bands.get("pr").copied().flatten(),
            tmin: bands.get("tmmn").copied().flatten(),
            tmax: bands.get("tmmx").copied().flatten(),
        },
        Err(e) => {
            warn!("climate query failed for ({}, {}) at {}: {}", lat, lon, month, e);
            MonthlyClimate::default()
        }
    }
}

/// Reduce the monthly values into the model's climate features.
pub fn aggregate(months: &[MonthlyClimate]) -> ClimateSummary {
    // ---
    // Null precipitation months count as zero
    let precip: Vec<f64> = months.iter().map(|m| m.precip.unwrap_or(0.0)).collect();

    // Temperature months need both bounds; mean of (tmin + tmax) / 2
    let temps: Vec<f64> = months
        .iter()
        .filter_map(|m| match (m.tmin, m.tmax) {
            (Some(lo), Some(hi)) => Some((lo + hi) / 2.0),
            _ => None,
        })
        .collect();

    let mean_precip = mean(&precip).unwrap_or(0.0);
    ClimateSummary {
        mean_monthly_precip: mean_precip,
        std_monthly_precip: population_std(&precip, mean_precip),
        mean_annual_temp: mean(&temps),
    }
}

/// Population standard deviation (ddof = 0), as the original precipitation
/// aggregation computed it.
fn population_std(values: &[f64], mean: f64) -> f64 {
    // ---
    if values.is_empty() {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / values.len() as f64).sqrt()
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn month(precip: Option<f64>, tmin: Option<f64>, tmax: Option<f64>) -> MonthlyClimate {
        MonthlyClimate { precip, tmin, tmax }
    }

    #[test]
    fn null_precip_counts_as_zero() {
        // ---
        let months = [
            month(Some(40.0), None, None),
            month(None, None, None),
            month(Some(20.0), None, None),
        ];
        let summary = aggregate(&months);
        assert!((summary.mean_monthly_precip - 20.0).abs() < 1e-12);
    }

    #[test]
    fn precip_std_is_population_std() {
        // ---
        let months = [
            month(Some(10.0), None, None),
            month(Some(30.0), None, None),
        ];
        let summary = aggregate(&months);
        // population std of {10, 30} is 10, not the sample std ~14.14
        assert!((summary.std_monthly_precip - 10.0).abs() < 1e-12);
    }

    #[test]
    fn temperature_months_missing_a_bound_are_skipped() {
        // ---
        let months = [
            month(None, Some(2.0), Some(12.0)),
            month(None, Some(5.0), None),
            month(None, None, Some(20.0)),
            month(None, Some(8.0), Some(18.0)),
        ];
        let summary = aggregate(&months);
        // (7 + 13) / 2
        assert!((summary.mean_annual_temp.unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn empty_record_set_degrades_gracefully() {
        // ---
        let summary = aggregate(&[]);
        assert_eq!(summary.mean_monthly_precip, 0.0);
        assert_eq!(summary.std_monthly_precip, 0.0);
        assert_eq!(summary.mean_annual_temp, None);
    }
}

//! Data model for the SOC pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---

/// One sample location from the survey CSVs (`date_location_*.csv`).
#[derive(Debug, Clone, Deserialize)]
pub struct SamplePoint {
    // ---
    pub lat: f64,
    pub long: f64,
    pub sample_date: String,
}

/// Soil texture fractions in percent. The three fractions must sum to 100
/// before any prediction is allowed.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Texture {
    // ---
    pub sand: f64,
    pub silt: f64,
    pub clay: f64,
}

impl Texture {
    // ---
    pub fn sum(&self) -> f64 {
        self.sand + self.silt + self.clay
    }

    /// Fractions must sum to 100 within a small tolerance for manual entry.
    pub fn is_valid(&self) -> bool {
        (self.sum() - 100.0).abs() < 0.01
    }
}

/// A bounded date range for one remote-sensing query. Never persisted.
/// `start`/`end` are the archive filter bounds; `period` is the month or
/// quarter start the resulting record is labeled with, which the widened
/// filter bounds straddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    // ---
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub period: NaiveDate,
}

impl TimeWindow {
    // ---
    /// Label used as the `date` column of the resulting record.
    pub fn label(&self) -> String {
        self.period.format("%Y-%m-%d").to_string()
    }
}

/// One row of index values per sample point per time window. Any field may be
/// null when no cloud-free image survives the window's filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    // ---
    pub date: String,
    #[serde(rename = "NDVI")]
    pub ndvi: Option<f64>,
    #[serde(rename = "NDMI")]
    pub ndmi: Option<f64>,
    #[serde(rename = "BSI")]
    pub bsi: Option<f64>,
    #[serde(rename = "SOCI")]
    pub soci: Option<f64>,
}

impl IndexRecord {
    // ---
    /// The all-null record for a window with zero qualifying images.
    pub fn empty(date: String) -> Self {
        IndexRecord {
            date,
            ndvi: None,
            ndmi: None,
            bsi: None,
            soci: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ndvi.is_none() && self.ndmi.is_none() && self.bsi.is_none() && self.soci.is_none()
    }
}

/// Mean / sample std / least-squares trend per index, aggregated over one
/// point's full series. Field names double as model feature keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IndexStats {
    // ---
    #[serde(rename = "NDVI_mean")]
    pub ndvi_mean: Option<f64>,
    #[serde(rename = "NDVI_std")]
    pub ndvi_std: Option<f64>,
    #[serde(rename = "NDVI_trend")]
    pub ndvi_trend: Option<f64>,
    #[serde(rename = "NDMI_mean")]
    pub ndmi_mean: Option<f64>,
    #[serde(rename = "NDMI_std")]
    pub ndmi_std: Option<f64>,
    #[serde(rename = "NDMI_trend")]
    pub ndmi_trend: Option<f64>,
    #[serde(rename = "BSI_mean")]
    pub bsi_mean: Option<f64>,
    #[serde(rename = "BSI_std")]
    pub bsi_std: Option<f64>,
    #[serde(rename = "BSI_trend")]
    pub bsi_trend: Option<f64>,
    #[serde(rename = "SOCI_mean")]
    pub soci_mean: Option<f64>,
    #[serde(rename = "SOCI_std")]
    pub soci_std: Option<f64>,
    #[serde(rename = "SOCI_trend")]
    pub soci_trend: Option<f64>,
}

/// Aggregated climate record for one point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateSummary {
    // ---
    pub mean_monthly_precip: f64,
    pub std_monthly_precip: f64,
    #[serde(default)]
    pub mean_annual_temp: Option<f64>,
}

/// Closed land-cover vocabulary from the survey data, one-hot encoded into
/// the model input row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandCover {
    Cropland,
    Grassland,
    Woodland,
    Shrubland,
    Bareland,
}

impl LandCover {
    // ---
    pub const ALL: [LandCover; 5] = [
        LandCover::Cropland,
        LandCover::Grassland,
        LandCover::Woodland,
        LandCover::Shrubland,
        LandCover::Bareland,
    ];

    /// One-hot column name for this category.
    pub fn column(&self) -> &'static str {
        match self {
            LandCover::Cropland => "lc_cropland",
            LandCover::Grassland => "lc_grassland",
            LandCover::Woodland => "lc_woodland",
            LandCover::Shrubland => "lc_shrubland",
            LandCover::Bareland => "lc_bareland",
        }
    }
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn texture_sums_to_100_is_valid() {
        // ---
        let t = Texture {
            sand: 40.0,
            silt: 35.0,
            clay: 25.0,
        };
        assert!(t.is_valid());

        // Small float error from form entry is tolerated
        let t = Texture {
            sand: 33.33,
            silt: 33.33,
            clay: 33.34,
        };
        assert!(t.is_valid());
    }

    #[test]
    fn texture_not_summing_to_100_is_invalid() {
        // ---
        let t = Texture {
            sand: 40.0,
            silt: 35.0,
            clay: 30.0,
        };
        assert!(!t.is_valid());

        let t = Texture {
            sand: 0.0,
            silt: 0.0,
            clay: 0.0,
        };
        assert!(!t.is_valid());
    }

    #[test]
    fn window_label_is_the_period_start() {
        // ---
        // Filter bounds are widened past the month; the label is not.
        let w = TimeWindow {
            start: NaiveDate::from_ymd_opt(2023, 3, 17).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 5, 15).unwrap(),
            period: NaiveDate::from_ymd_opt(2023, 4, 1).unwrap(),
        };
        assert_eq!(w.label(), "2023-04-01");
    }

    #[test]
    fn empty_record_has_all_null_indices() {
        // ---
        let rec = IndexRecord::empty("2023-04-01".to_string());
        assert!(rec.is_empty());
        assert_eq!(rec.date, "2023-04-01");
    }

    #[test]
    fn index_record_serializes_with_uppercase_keys() {
        // ---
        let rec = IndexRecord {
            date: "2023-04-01".to_string(),
            ndvi: Some(0.61),
            ndmi: None,
            bsi: Some(-0.12),
            soci: Some(1.8),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["NDVI"], 0.61);
        assert!(json["NDMI"].is_null());
        assert_eq!(json["date"], "2023-04-01");
    }

    #[test]
    fn land_cover_columns_are_unique() {
        // ---
        let mut cols: Vec<&str> = LandCover::ALL.iter().map(|lc| lc.column()).collect();
        cols.sort();
        cols.dedup();
        assert_eq!(cols.len(), LandCover::ALL.len());
    }
}

//! Model-input row assembly.
//!
//! Flattens the form inputs, categorical encodings, index statistics, and
//! climate summary into one `column -> value` map. Remote statistics that
//! could not be computed become NaN so the scorer's missing-value handling
//! applies. Whether the result matches the model's training schema is the
//! model's call, not this module's; assembly stays mechanical.

use std::collections::BTreeMap;

use crate::encodings::Encodings;
use crate::models::{ClimateSummary, IndexStats, LandCover, Texture};

// ---

/// Everything the form (or a batch caller) supplies for one prediction.
#[derive(Debug, Clone)]
pub struct FeatureInput {
    // ---
    pub elevation: f64,
    pub texture: Texture,
    pub land_cover: LandCover,
    pub vegetation: String,
    pub index_stats: IndexStats,
    pub climate: ClimateSummary,
}

/// Build the flat feature row for one input.
pub fn assemble(input: &FeatureInput, encodings: &Encodings) -> BTreeMap<String, f64> {
    // ---
    let mut row = BTreeMap::new();

    row.insert("elevation".to_string(), input.elevation);
    row.insert("sand".to_string(), input.texture.sand);
    row.insert("silt".to_string(), input.texture.silt);
    row.insert("clay".to_string(), input.texture.clay);

    row.insert(
        "mean_monthly_precip".to_string(),
        input.climate.mean_monthly_precip,
    );
    row.insert(
        "std_monthly_precip".to_string(),
        input.climate.std_monthly_precip,
    );
    row.insert(
        "mean_annual_temp".to_string(),
        input.climate.mean_annual_temp.unwrap_or(f64::NAN),
    );

    // The stats struct serializes with its feature column names; null -> NaN
    if let Ok(serde_json::Value::Object(stats)) = serde_json::to_value(&input.index_stats) {
        for (key, value) in stats {
            row.insert(key, value.as_f64().unwrap_or(f64::NAN));
        }
    }

    row.insert(
        "veg_freq_enc".to_string(),
        encodings.freq(&input.vegetation),
    );
    row.insert(
        "veg_target_enc".to_string(),
        encodings.target(&input.vegetation),
    );

    for lc in LandCover::ALL {
        let hot = if lc == input.land_cover { 1.0 } else { 0.0 };
        row.insert(lc.column().to_string(), hot);
    }

    row
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashMap;

    fn sample_input() -> FeatureInput {
        FeatureInput {
            elevation: 50.0,
            texture: Texture {
                sand: 40.0,
                silt: 35.0,
                clay: 25.0,
            },
            land_cover: LandCover::Grassland,
            vegetation: "clover".to_string(),
            index_stats: IndexStats {
                ndvi_mean: Some(0.55),
                ndvi_std: Some(0.08),
                ndvi_trend: None,
                ..Default::default()
            },
            climate: ClimateSummary {
                mean_monthly_precip: 61.0,
                std_monthly_precip: 18.5,
                mean_annual_temp: None,
            },
        }
    }

    fn sample_encodings() -> Encodings {
        let mut freq = HashMap::new();
        freq.insert("clover".to_string(), 88.0);
        let mut target = HashMap::new();
        target.insert("clover".to_string(), 2.4);
        Encodings::from_maps(freq, target)
    }

    #[test]
    fn row_carries_the_full_column_set() {
        // ---
        let row = assemble(&sample_input(), &sample_encodings());

        let expected = [
            "elevation",
            "sand",
            "silt",
            "clay",
            "mean_monthly_precip",
            "std_monthly_precip",
            "mean_annual_temp",
            "NDVI_mean",
            "NDVI_std",
            "NDVI_trend",
            "NDMI_mean",
            "NDMI_std",
            "NDMI_trend",
            "BSI_mean",
            "BSI_std",
            "BSI_trend",
            "SOCI_mean",
            "SOCI_std",
            "SOCI_trend",
            "veg_freq_enc",
            "veg_target_enc",
            "lc_cropland",
            "lc_grassland",
            "lc_woodland",
            "lc_shrubland",
            "lc_bareland",
        ];
        let mut expected: Vec<&str> = expected.to_vec();
        expected.sort();
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn one_hot_marks_exactly_the_selected_cover() {
        // ---
        let row = assemble(&sample_input(), &sample_encodings());
        assert_eq!(row["lc_grassland"], 1.0);
        let hot: f64 = LandCover::ALL.iter().map(|lc| row[lc.column()]).sum();
        assert_eq!(hot, 1.0);
    }

    #[test]
    fn unseen_vegetation_encodes_to_zero() {
        // ---
        let mut input = sample_input();
        input.vegetation = "bamboo".to_string();
        let row = assemble(&input, &sample_encodings());
        assert_eq!(row["veg_freq_enc"], 0.0);
        assert_eq!(row["veg_target_enc"], 0.0);
    }

    #[test]
    fn absent_statistics_become_nan() {
        // ---
        let row = assemble(&sample_input(), &sample_encodings());
        assert!(row["mean_annual_temp"].is_nan());
        assert!(row["NDVI_trend"].is_nan());
        assert_eq!(row["NDVI_mean"], 0.55);
    }
}

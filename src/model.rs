//! The pre-trained SOC regressor.
//!
//! The artifact is a JSON export of a gradient-boosted tree ensemble:
//! `feature_names` (the training schema, in order), a base score, a learning
//! rate, and the trees as flat node arrays. Prediction is base plus the
//! learning-rate-scaled sum of per-tree leaf values. A NaN feature value
//! traverses left at every split, the booster's default direction.
//!
//! The feature schema is validated explicitly before every prediction:
//! missing and unexpected keys are reported by name instead of surfacing as
//! an opaque indexing failure deep in the scorer.

use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum PredictError {
    // ---
    #[error("soil texture fractions must sum to 100, got {0}")]
    InvalidTexture(f64),

    #[error("feature schema mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

/// One node of a decision tree. Leaf nodes carry `leaf`; split nodes carry
/// the feature index, threshold, and child indexes.
#[derive(Debug, Clone, Deserialize)]
struct Node {
    // ---
    #[serde(default)]
    feature: usize,
    #[serde(default)]
    threshold: f64,
    #[serde(default)]
    left: usize,
    #[serde(default)]
    right: usize,
    leaf: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    // ---
    nodes: Vec<Node>,
}

impl Tree {
    // ---
    fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        // node count bounds the walk; a malformed tree scores zero
        for _ in 0..=self.nodes.len() {
            let Some(node) = self.nodes.get(idx) else { break };
            if let Some(value) = node.leaf {
                return value;
            }
            let x = features.get(node.feature).copied().unwrap_or(f64::NAN);
            idx = if x.is_nan() || x < node.threshold {
                node.left
            } else {
                node.right
            };
        }
        0.0
    }
}

fn default_learning_rate() -> f64 {
    1.0
}

/// The loaded regressor. Immutable; loaded once per process.
#[derive(Debug, Clone, Deserialize)]
pub struct SocModel {
    // ---
    feature_names: Vec<String>,
    base_score: f64,
    #[serde(default = "default_learning_rate")]
    learning_rate: f64,
    trees: Vec<Tree>,
}

impl SocModel {
    // ---
    pub fn load(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact '{}'", path))?;
        let model: SocModel = serde_json::from_str(&raw)
            .with_context(|| format!("malformed model artifact '{}'", path))?;
        Ok(model)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// The assembled row must carry exactly the training columns, no more
    /// and no fewer. Key order is irrelevant; the key set must be identical.
    pub fn validate_schema(&self, row: &BTreeMap<String, f64>) -> Result<(), PredictError> {
        // ---
        let missing: Vec<String> = self
            .feature_names
            .iter()
            .filter(|name| !row.contains_key(*name))
            .cloned()
            .collect();
        let unexpected: Vec<String> = row
            .keys()
            .filter(|key| !self.feature_names.contains(key))
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(PredictError::SchemaMismatch { missing, unexpected })
        }
    }

    /// Validate the schema, vectorize in training order, and score.
    pub fn predict(&self, row: &BTreeMap<String, f64>) -> Result<f64, PredictError> {
        // ---
        self.validate_schema(row)?;

        let features: Vec<f64> = self
            .feature_names
            .iter()
            .map(|name| row[name])
            .collect();

        let boosted: f64 = self.trees.iter().map(|t| t.predict(&features)).sum();
        Ok(self.base_score + self.learning_rate * boosted)
    }
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    /// Two stumps over two features, the smallest ensemble worth scoring.
    fn tiny_model() -> SocModel {
        serde_json::from_str(
            r#"{
                "feature_names": ["elevation", "NDVI_mean"],
                "base_score": 1.5,
                "learning_rate": 0.5,
                "trees": [
                    {"nodes": [
                        {"feature": 0, "threshold": 100.0, "left": 1, "right": 2},
                        {"leaf": -0.4},
                        {"leaf": 0.8}
                    ]},
                    {"nodes": [
                        {"feature": 1, "threshold": 0.5, "left": 1, "right": 2},
                        {"leaf": 0.2},
                        {"leaf": 1.0}
                    ]}
                ]
            }"#,
        )
        .unwrap()
    }

    fn row(elevation: f64, ndvi: f64) -> BTreeMap<String, f64> {
        let mut row = BTreeMap::new();
        row.insert("elevation".to_string(), elevation);
        row.insert("NDVI_mean".to_string(), ndvi);
        row
    }

    #[test]
    fn prediction_sums_scaled_leaf_values() {
        // ---
        let model = tiny_model();
        // elevation 250 -> right (0.8), ndvi 0.3 -> left (0.2)
        let got = model.predict(&row(250.0, 0.3)).unwrap();
        assert!((got - (1.5 + 0.5 * (0.8 + 0.2))).abs() < 1e-12);
    }

    #[test]
    fn nan_features_traverse_left() {
        // ---
        let model = tiny_model();
        let got = model.predict(&row(f64::NAN, 0.7)).unwrap();
        assert!((got - (1.5 + 0.5 * (-0.4 + 1.0))).abs() < 1e-12);
    }

    #[test]
    fn missing_keys_are_named_in_the_error() {
        // ---
        let model = tiny_model();
        let mut incomplete = BTreeMap::new();
        incomplete.insert("elevation".to_string(), 50.0);

        match model.predict(&incomplete) {
            Err(PredictError::SchemaMismatch { missing, unexpected }) => {
                assert_eq!(missing, vec!["NDVI_mean".to_string()]);
                assert!(unexpected.is_empty());
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn unexpected_keys_block_prediction() {
        // ---
        let model = tiny_model();
        let mut drifted = row(50.0, 0.5);
        drifted.insert("ndvi_mean".to_string(), 0.5); // casing drift

        match model.validate_schema(&drifted) {
            Err(PredictError::SchemaMismatch { missing, unexpected }) => {
                assert!(missing.is_empty());
                assert_eq!(unexpected, vec!["ndvi_mean".to_string()]);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn key_order_does_not_matter() {
        // ---
        let model = tiny_model();
        // BTreeMap orders keys itself; insert in reverse of the schema
        let mut reversed = BTreeMap::new();
        reversed.insert("NDVI_mean".to_string(), 0.3);
        reversed.insert("elevation".to_string(), 250.0);
        assert_eq!(
            model.predict(&reversed).unwrap(),
            model.predict(&row(250.0, 0.3)).unwrap()
        );
    }
}

//! Categorical encodings for the vegetation-type field.
//!
//! Two read-only lookup tables produced during training: occurrence counts
//! (frequency encoding) and mean SOC per label (target encoding), stored as
//! flat JSON `label -> number` maps. A label the training data never saw
//! encodes to 0.0 rather than failing the request.

use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};

// ---

pub struct Encodings {
    // ---
    freq: HashMap<String, f64>,
    target: HashMap<String, f64>,
}

impl Encodings {
    // ---
    /// Load both encoding artifacts. Missing or malformed files are startup
    /// failures and propagate.
    pub fn load(freq_path: &str, target_path: &str) -> Result<Self> {
        Ok(Encodings {
            freq: load_map(freq_path)?,
            target: load_map(target_path)?,
        })
    }

    pub fn from_maps(freq: HashMap<String, f64>, target: HashMap<String, f64>) -> Self {
        Encodings { freq, target }
    }

    /// Frequency encoding, 0.0 for unseen labels.
    pub fn freq(&self, label: &str) -> f64 {
        self.freq.get(label).copied().unwrap_or(0.0)
    }

    /// Target (mean SOC) encoding, 0.0 for unseen labels.
    pub fn target(&self, label: &str) -> f64 {
        self.target.get(label).copied().unwrap_or(0.0)
    }
}

fn load_map(path: &str) -> Result<HashMap<String, f64>> {
    // ---
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read encoding artifact '{}'", path))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed encoding artifact '{}'", path))
}

// ---

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn sample() -> Encodings {
        let mut freq = HashMap::new();
        freq.insert("winter wheat".to_string(), 412.0);
        let mut target = HashMap::new();
        target.insert("winter wheat".to_string(), 1.92);
        Encodings::from_maps(freq, target)
    }

    #[test]
    fn known_labels_resolve_to_their_values() {
        // ---
        let enc = sample();
        assert_eq!(enc.freq("winter wheat"), 412.0);
        assert_eq!(enc.target("winter wheat"), 1.92);
    }

    #[test]
    fn unseen_labels_default_to_zero() {
        // ---
        let enc = sample();
        assert_eq!(enc.freq("quinoa"), 0.0);
        assert_eq!(enc.target("quinoa"), 0.0);
    }
}

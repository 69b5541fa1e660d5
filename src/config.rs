//! Configuration loader for the `soc-pipeline` binary.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.

use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional string environment variable with a default value.
macro_rules! parse_env_str {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Path to the geospatial platform service-account JSON key.
    pub gee_key_path: String,

    /// Cloud project the platform requests are billed against.
    pub gee_project: String,

    /// Base URL of the platform REST API.
    pub gee_api_url: String,

    /// Drive folder that table exports land in.
    pub export_folder: String,

    /// Path to the serialized gradient-boosted regressor artifact.
    pub model_path: String,

    /// Path to the vegetation frequency-encoding artifact.
    pub freq_encoding_path: String,

    /// Path to the vegetation target-encoding artifact.
    pub target_encoding_path: String,

    /// Port the prediction API listens on.
    pub port: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `GEE_KEY_PATH` – service-account JSON key file
/// - `GEE_PROJECT` – cloud project id
///
/// Optional:
/// - `GEE_API_URL` – platform base URL (default: public endpoint)
/// - `EXPORT_FOLDER` – Drive folder for exports (default: EarthEngineExports)
/// - `MODEL_PATH`, `FREQ_ENCODING_PATH`, `TARGET_ENCODING_PATH` – artifact paths
/// - `PORT` – API port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let gee_key_path = require_env!("GEE_KEY_PATH");
    let gee_project = require_env!("GEE_PROJECT");
    let gee_api_url = parse_env_str!("GEE_API_URL", "https://earthengine.googleapis.com/v1");
    let export_folder = parse_env_str!("EXPORT_FOLDER", "EarthEngineExports");
    let model_path = parse_env_str!("MODEL_PATH", "artifacts/soc_model.json");
    let freq_encoding_path =
        parse_env_str!("FREQ_ENCODING_PATH", "artifacts/veg_freq_encoding.json");
    let target_encoding_path =
        parse_env_str!("TARGET_ENCODING_PATH", "artifacts/veg_target_encoding.json");
    let port = parse_env_u32!("PORT", 8080);

    Ok(Config {
        gee_key_path,
        gee_project,
        gee_api_url,
        export_folder,
        model_path,
        freq_encoding_path,
        target_encoding_path,
        port,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  GEE_KEY_PATH         : {}", self.gee_key_path);
        tracing::info!("  GEE_PROJECT          : {}", self.gee_project);
        tracing::info!("  GEE_API_URL          : {}", self.gee_api_url);
        tracing::info!("  EXPORT_FOLDER        : {}", self.export_folder);
        tracing::info!("  MODEL_PATH           : {}", self.model_path);
        tracing::info!("  FREQ_ENCODING_PATH   : {}", self.freq_encoding_path);
        tracing::info!("  TARGET_ENCODING_PATH : {}", self.target_encoding_path);
        tracing::info!("  PORT                 : {}", self.port);
    }
}

//! Entry point for the `soc-pipeline` binary.
//!
//! One executable covers every stage of the SOC estimation workflow:
//! - `backfill-elevation` – fill missing elevation cells of a sample CSV
//! - `fetch-indices` / `fetch-climate` – per-point remote-sensing extraction
//! - `export-quarterly` – batch table exports for the full sample set
//! - `serve` – the HTTP API behind the prediction form
//!
//! Startup sequence for every subcommand: initialize structured tracing,
//! load `.env`, parse the typed configuration, then dispatch. Route
//! registration is delegated to the `routes` gateway and configuration
//! parsing to `config`, so this module stays orchestration only.
//!
//! # Environment Variables
//! - `GEE_KEY_PATH` (**required**) – service-account JSON key
//! - `GEE_PROJECT` (**required**) – cloud project id
//! - `SOC_LOG_LEVEL` / `RUST_LOG` (optional) – log verbosity
//! - `SOC_SPAN_EVENTS` (optional) – span event mode for tracing

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::{Context, Result};

mod climate;
mod config;
mod elevation;
mod encodings;
mod export;
mod features;
mod gee;
mod indices;
mod model;
mod models;
mod routes;

pub use config::Config;

use crate::encodings::Encodings;
use crate::gee::EeClient;
use crate::indices::{Cadence, ExtractionPolicy, Sensor};
use crate::model::SocModel;

// ---

#[derive(Parser)]
#[command(name = "soc-pipeline")]
#[command(about = "Soil organic carbon data pipeline and prediction service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prediction API
    Serve,
    /// Fill missing elevation values of a sample CSV, in place
    BackfillElevation {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Fetch the vegetation-index series and statistics for one point
    FetchIndices {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long, value_enum, default_value = "sentinel2")]
        sensor: Sensor,
        #[arg(long, value_enum)]
        cadence: Option<Cadence>,
        /// Write the series as CSV to this path instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch the aggregated climate record for one point
    FetchClimate {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
    },
    /// Submit quarterly index-composite exports for a sample CSV
    ExportQuarterly {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "2015-01-01")]
        start: NaiveDate,
    },
}

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cli = Cli::parse();
    let cfg = config::load_from_env()?;
    cfg.log_config();

    match cli.command {
        Commands::Serve => serve(cfg).await?,
        Commands::BackfillElevation { csv } => {
            let client = EeClient::new(&cfg)?;
            let report = elevation::backfill_elevation(&client, &csv).await?;
            println!(
                "{} rows, {} were missing elevation, {} filled.",
                report.total, report.missing, report.filled
            );
        }
        Commands::FetchIndices {
            lat,
            lon,
            sensor,
            cadence,
            out,
        } => {
            let client = EeClient::new(&cfg)?;
            let mut policy = ExtractionPolicy::for_sensor(sensor);
            if let Some(cadence) = cadence {
                policy.cadence = cadence;
            }

            let today = chrono::Utc::now().date_naive();
            let series = indices::fetch_index_series(&client, &policy, lat, lon, today).await;
            let stats = indices::series_stats(&series);

            match out {
                Some(path) => {
                    let mut writer = csv::Writer::from_path(&path)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    for record in &series {
                        writer.serialize(record)?;
                    }
                    writer.flush()?;
                    println!("Series written to {}.", path.display());
                }
                None => {
                    for record in &series {
                        println!("{}", serde_json::to_string(record)?);
                    }
                }
            }
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::FetchClimate { lat, lon } => {
            let client = EeClient::new(&cfg)?;
            let today = chrono::Utc::now().date_naive();
            let summary = climate::fetch_climate_summary(&client, lat, lon, today).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::ExportQuarterly { csv, start } => {
            let client = EeClient::new(&cfg)?;
            export::run_quarterly_exports(&client, &cfg, &csv, start).await?;
        }
    }

    Ok(())
}

// ---

/// Start the prediction API: load the model and encoding artifacts once,
/// build the platform client, mount the route gateway, and serve.
async fn serve(cfg: Config) -> Result<()> {
    // ---
    let model = SocModel::load(&cfg.model_path)?;
    tracing::info!(
        "Model loaded: {} features, from {}",
        model.feature_names().len(),
        cfg.model_path
    );

    let encodings = Encodings::load(&cfg.freq_encoding_path, &cfg.target_encoding_path)?;
    let client = EeClient::new(&cfg)?;

    let state = routes::AppState {
        gee: Arc::new(client),
        model: Arc::new(model),
        encodings: Arc::new(encodings),
    };
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port as u16));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize the global tracing subscriber for structured logging.
///
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR`
/// - Span event emission mode controlled by `SOC_SPAN_EVENTS`
///   (`"full"`, `"enter_exit"`, default CLOSE only)
/// - Log level from `RUST_LOG`, falling back to `SOC_LOG_LEVEL`
///
/// Called once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("SOC_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to SOC_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SOC_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},reqwest=warn,hyper=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

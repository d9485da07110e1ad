mod artifacts;
mod config;
mod error;
mod features;
mod ingest;
mod model;
mod pipeline;
mod predict;
mod types;
mod web;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use artifacts::ArtifactStore;
use config::AppConfig;
use features::FeatureEngine;
use ingest::{drop_missing, RecordStore};
use predict::Predictor;
use web::{start_server, AppState};

#[derive(Parser)]
#[command(name = "price-forecaster")]
#[command(version = "0.1.0")]
#[command(about = "Daily price forecasting pipeline and server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a historical price CSV and store the artifact
    Train {
        /// Input CSV with date, open, high, low, close, volume columns
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Forecast the next close for the latest row of a price CSV
    Predict {
        /// Input CSV with date, open, high, low, close, volume columns
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Serve forecasts over HTTP
    Serve {
        /// Port override; defaults to the configured serving port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List stored model artifacts
    Artifacts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::load(&cli.config)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            tracing::error!("Invalid configuration: {}", e);
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    match cli.command {
        Commands::Train { input } => {
            run_train(&config, &input)?;
        }
        Commands::Predict { input } => {
            run_predict(&config, &input)?;
        }
        Commands::Serve { port } => {
            run_serve(&config, port).await?;
        }
        Commands::Artifacts => {
            list_artifacts(&config)?;
        }
    }

    Ok(())
}

fn run_train(config: &AppConfig, input: &std::path::Path) -> Result<()> {
    info!("Training from {}", input.display());
    let outcome = pipeline::run_training(config, input)?;

    println!("Artifact: {}", outcome.artifact_id);
    println!(
        "Rows: {} train / {} test",
        outcome.train_rows, outcome.test_rows
    );
    let m = outcome.metrics;
    println!(
        "Metrics: mse {:.4}  rmse {:.4}  mae {:.4}  r2 {:.4}  mape {:.2}%",
        m.mse, m.rmse, m.mae, m.r2, m.mape
    );
    println!("Top features by |coefficient|:");
    for (name, weight) in outcome.importance.iter().take(5) {
        println!("  {:<18} {:.6}", name, weight);
    }
    Ok(())
}

fn run_predict(config: &AppConfig, input: &std::path::Path) -> Result<()> {
    let store = ArtifactStore::new(&config.artifacts.dir);
    let artifact = store.load_latest()?;
    info!(
        "Using artifact {} (version {})",
        artifact.id, artifact.version
    );

    let records = drop_missing(RecordStore::load(input)?);
    let frame = FeatureEngine::transform(&records);
    let predictor = Predictor::new(config.serving.confidence_policy());
    let results = predictor.predict(&artifact, &frame)?;

    let Some(last) = results.last() else {
        anyhow::bail!("input has too few rows to derive features");
    };
    println!("As of {}:", last.timestamp);
    println!("  next close forecast: {:.4}", last.forecast);
    println!(
        "  confidence: {} ({:.4})",
        last.confidence.as_str(),
        last.confidence_score
    );
    println!("  recent trend: {:?}", last.trend);
    Ok(())
}

async fn run_serve(config: &AppConfig, port_override: Option<u16>) -> Result<()> {
    let store = ArtifactStore::new(&config.artifacts.dir);
    let state = AppState::new(store, config.serving.clone());

    // Start without a model rather than failing; /api/reload picks one up
    // once a training run lands.
    match state.reload().await {
        Ok(version) => info!("Loaded artifact version {}", version),
        Err(e) => warn!("Starting without a model: {}", e),
    }

    let port = port_override.unwrap_or(config.serving.port);
    start_server(state, port).await
}

fn list_artifacts(config: &AppConfig) -> Result<()> {
    let store = ArtifactStore::new(&config.artifacts.dir);
    let artifacts = store.list()?;
    if artifacts.is_empty() {
        println!("No artifacts in {}", store.dir().display());
        return Ok(());
    }
    for a in artifacts {
        println!(
            "{}  version {}  trained {}  r2 {:.4}",
            a.id,
            a.version,
            a.trained_at.format("%Y-%m-%d %H:%M:%S"),
            a.metrics.r2
        );
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn, Level};

mod config;
mod data;
mod error;
mod ml;
mod web;

use crate::config::Config;
use crate::data::Dataset;
use crate::ml::{Forecaster, ModelRegistry};
use crate::web::WebServer;

#[derive(Parser)]
#[command(name = "co2-forecast")]
#[command(about = "Serves CO2 emission forecasts from pre-fitted regression models")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Overrides `server.port` from the config file.
    #[arg(long)]
    port: Option<u16>,
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level: Level = config
        .logging
        .level
        .parse()
        .with_context(|| format!("invalid log level {:?}", config.logging.level))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    if !Path::new(&cli.config).exists() {
        warn!("Config file {} not found, using defaults", cli.config);
    }

    info!("Starting CO2 forecast service");

    let covid = config.covid.window();
    let (dataset, scaler) = Dataset::load(&config.data, &covid)?;
    let stats = dataset.statistics();
    if let Some((start, end)) = dataset.date_range() {
        info!(
            "Dataset: {} rows from {} to {}, range [{:.2}, {:.2}], mean {:.2}, std dev {:.2}",
            stats.count, start, end, stats.min, stats.max, stats.mean, stats.std_dev
        );
    }
    info!("Scaler fitted on [{}, {}]", scaler.min, scaler.max);

    let registry = ModelRegistry::load(&config.models)?;
    for (name, r2) in registry.evaluate(&dataset) {
        info!("{}: in-sample R² {:.4}", name, r2);
    }

    let forecaster = Forecaster::new(Arc::new(registry), scaler);
    let server = WebServer::new(forecaster, config.server.static_dir.clone());
    let port = cli.port.unwrap_or(config.server.port);

    let listener = server.bind(&config.server.host, port).await?;
    info!("Forecast page available at http://{}:{}", config.server.host, port);

    server
        .serve(listener, async {
            // Wait for shutdown signal
            if let Err(e) = signal::ctrl_c().await {
                warn!("Could not listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received, stopping server...");
        })
        .await?;

    Ok(())
}

//! Tradepulse Server - headless decision pipeline
//!
//! Runs the full pipeline without any UI: data collection, streaming
//! retraining, forecast serving, and oracle publishing. Metrics are
//! pushed via structured JSON logs to stdout.
//!
//! # Usage
//! ```sh
//! MODE=mock cargo run --bin server
//! ```
//!
//! # Environment Variables
//! - `MODE` - 'mock' or 'live' (default: mock)
//! - `SYMBOL` - trading pair (default: BTC/USDT)
//! - `OBSERVABILITY_INTERVAL` - seconds between metric outputs (default: 60)

use anyhow::Result;
use clap::Parser;
use tradepulse::application::system::Application;
use tradepulse::config::Config;
use tradepulse::infrastructure::observability::MetricsReporter;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(version, about = "Tradepulse headless decision pipeline")]
struct Args {
    /// Start with streaming disabled (enable later via the control API).
    #[arg(long)]
    no_streaming: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();

    info!("Tradepulse Server {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Mode={:?}, Symbol={}, ModelDir={:?}",
        config.mode, config.symbol, config.model_dir
    );

    let observability = config.observability.clone();

    info!("Building decision pipeline...");
    let app = Application::build(config)?;

    info!("Starting pipeline...");
    let handle = app.start().await?;

    if args.no_streaming {
        handle.streaming.stop().await;
        info!("Streaming disabled by flag.");
    }

    if observability.enabled {
        let reporter = MetricsReporter::new(
            handle.streaming.clone(),
            handle.metrics.clone(),
            observability.interval_secs,
        );
        tokio::spawn(async move {
            reporter.run().await;
        });
        info!(
            "Metrics reporter started (interval: {}s)",
            observability.interval_secs
        );
    } else {
        info!("Metrics reporting disabled.");
    }

    info!("Server running. Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");
    handle.shutdown().await;

    Ok(())
}

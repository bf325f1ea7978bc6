//! rvoip-traffic: synthetic call traffic behind a small HTTP API

mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rvoip_traffic_core::logging::{parse_log_level, setup_logging, LoggingConfig};
use rvoip_traffic_core::{TrafficConfig, TrafficEngine};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rvoip-traffic", version, about = "Generate simulated call traffic and CDRs")]
struct Args {
    /// Address the HTTP API listens on
    #[arg(long, env = "RVOIP_TRAFFIC_LISTEN", default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// TOML or JSON engine configuration
    #[arg(long, env = "RVOIP_TRAFFIC_CONFIG")]
    config: Option<PathBuf>,

    /// Default log level (RUST_LOG directives take precedence)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Divisor applied to simulated call durations
    #[arg(long)]
    time_multiplier: Option<f64>,

    /// Seed for reproducible outcome draws
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn traffic_config(&self) -> Result<TrafficConfig> {
        let mut config = match &self.config {
            Some(path) => TrafficConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TrafficConfig::default(),
        };
        if let Some(multiplier) = self.time_multiplier {
            config.time_multiplier = multiplier;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "rvoip-traffic");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let config = args.traffic_config()?;
    let engine = Arc::new(TrafficEngine::start(config).context("starting traffic engine")?);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!("Listening on http://{}", args.listen);

    axum::serve(listener, routes::router(engine.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

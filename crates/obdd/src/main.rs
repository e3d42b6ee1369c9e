//! obdd - OBD-II telemetry daemon
//!
//! Polls the vehicle through an ELM327 dongle (or the built-in simulated
//! vehicle) and serves the live readings over HTTP and SSE.
//!
//! Usage:
//!   obdd [OPTIONS] [config.toml]
//!
//! If no config file is provided, the simulated vehicle is used.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use obd_api::{create_router, AppState};
use obd_pipeline::Pipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DaemonConfig;

#[derive(Debug, Parser)]
#[command(name = "obdd", version, about = "OBD-II live telemetry daemon")]
struct Args {
    /// Daemon config file (TOML)
    config: Option<PathBuf>,

    /// Address to serve the HTTP API on (overrides [server].listen)
    #[arg(short, long, env = "OBDD_LISTEN")]
    listen: Option<SocketAddr>,

    /// Metric catalog (YAML), replaces the built-in Mode 01 catalog
    #[arg(short, long)]
    metrics: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "obdd=info,obd_pipeline=info,obd_api=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    tracing::info!("Starting obdd (OBD-II telemetry daemon)");

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading config");
            DaemonConfig::load(path)?
        }
        None => {
            tracing::info!("No config file provided, using simulated vehicle");
            DaemonConfig::default()
        }
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(metrics) = args.metrics {
        config.pipeline.metrics = Some(metrics);
    }

    let pipeline = Pipeline::start(&config.pipeline).await?;
    let app = create_router(AppState::new(&pipeline));

    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;
    tracing::info!("Listening on http://{}", config.server.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown().await;
    Ok(())
}

//! Forcing API Server
//!
//! Serves NWM forecast precipitation as map-ready polygons.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use forcing_api::config::ServiceConfig;
use forcing_api::fetcher::HttpFetcher;
use forcing_api::state::AppState;

/// Forcing API Server
#[derive(Parser, Debug)]
#[command(name = "forcing-api")]
#[command(about = "NWM forecast forcing map server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8085", env = "FORCING_LISTEN_ADDR")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Number of worker threads
    #[arg(long, env = "FORCING_WORKER_THREADS")]
    worker_threads: Option<usize>,

    /// YAML configuration file
    #[arg(short, long, env = "FORCING_CONFIG")]
    config: Option<PathBuf>,

    /// Concurrent loads in parallel mode (0 = one per physical core)
    #[arg(long, env = "FORCING_LOAD_WORKERS")]
    load_workers: Option<usize>,

    /// Per-load timeout in seconds
    #[arg(long, env = "FORCING_LOAD_TIMEOUT_SECS")]
    load_timeout_secs: Option<u64>,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Build runtime with configured threads
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder
        .build()
        .context("Failed to create Tokio runtime")?;
    runtime.block_on(run_server(args))
}

async fn run_server(args: Args) -> Result<()> {
    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    // Initialize Prometheus metrics exporter
    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Starting forcing API server");

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(workers) = args.load_workers {
        config.pipeline.workers = workers;
    }
    if let Some(secs) = args.load_timeout_secs {
        config.pipeline.load_timeout_secs = secs;
    }
    config.validate()?;

    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    let state = Arc::new(AppState::new(config, fetcher)?.with_prometheus(prometheus_handle));

    let app = forcing_api::router(state);

    // Parse listen address
    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", args.listen))?;

    info!(address = %addr, "Forcing API listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind")?;
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}

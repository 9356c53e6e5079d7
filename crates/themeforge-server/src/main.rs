//! Themeforge Server
//!
//! HTTP front end for the theme generation pipeline. Requests are handed to
//! the request dispatcher; every failure comes back as `{ok: false, error}`.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use themeforge_inference::InferenceGateway;
use themeforge_pipeline::{
    RequestDispatcher, StaticPreferenceSource, StaticTrendSource, ThemeGenerationCoordinator,
};
use tokio::signal;
use tracing::{info, warn};

mod config;
mod routes;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "themeforge-server")]
#[command(about = "Themeforge illustration theme generation server", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "THEMEFORGE_CONFIG", default_value = "themeforge.yaml")]
    config: String,

    /// Default inference provider
    #[arg(long, env = "THEMEFORGE_PROVIDER")]
    provider: Option<String>,

    /// Default chat model id
    #[arg(short, long, env = "THEMEFORGE_MODEL")]
    model: Option<String>,

    /// Default chat endpoint base address
    #[arg(long, env = "THEMEFORGE_BASE_ADDRESS")]
    base_address: Option<String>,

    /// Default chat endpoint credential
    #[arg(long, env = "THEMEFORGE_API_KEY", hide_env_values = true)]
    credential: Option<String>,

    /// Project root for models and reports
    #[arg(long, env = "THEMEFORGE_ROOT")]
    root_dir: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long, env = "THEMEFORGE_LISTEN", default_value = "0.0.0.0")]
    listen: String,

    /// Listen port
    #[arg(short = 'P', long, env = "THEMEFORGE_PORT", default_value = "8080")]
    port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting Themeforge server");

    let config = ServerConfig::load(&cli.config, &cli)?;
    info!(
        provider = %config.gateway.provider,
        model = %config.gateway.model,
        root = %config.root_dir.display(),
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;

    let gateway = InferenceGateway::new(config.gateway())?;
    let coordinator = ThemeGenerationCoordinator::new(config.coordinator())?
        .with_runner(Arc::new(gateway))?
        .with_trend_source(Arc::new(StaticTrendSource::new()))
        .with_preference_source(Arc::new(StaticPreferenceSource::default()));
    let dispatcher = RequestDispatcher::new(Arc::new(coordinator));

    let state = routes::AppState {
        config: Arc::new(config),
        dispatcher: Arc::new(dispatcher),
        metrics_handle,
    };
    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", cli.listen, cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("themeforge=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("themeforge=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "themeforge_generations_total",
        "Successful theme generations by path"
    );
    metrics::describe_counter!(
        "themeforge_generation_failures_total",
        "Theme generations that ended in an error"
    );
    metrics::describe_histogram!(
        "themeforge_generation_latency_ms",
        metrics::Unit::Milliseconds,
        "Theme generation latency in milliseconds"
    );
    metrics::describe_counter!(
        "themeforge_http_requests_total",
        "HTTP requests by request kind"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}

//! Inference Relay - Main entry point
//!
//! Loads configuration, builds the provider chains and serves the relay API.

use anyhow::{Context, Result};
use chrono::Local;
use inference_relay::{
    api::{router, AppState},
    core::{init_metrics, AppConfig},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(worker_threads) = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
    {
        builder.worker_threads(worker_threads);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async_main())
}

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing() {
    // NO_COLOR disables ANSI codes, for file logging
    let no_color = std::env::var("NO_COLOR").is_ok();

    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,inference_relay=debug".to_string());

    // Always suppress noisy HTTP library logs regardless of RUST_LOG setting
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    ));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .init();
}

async fn async_main() -> Result<()> {
    init_tracing();
    init_metrics();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = AppState::from_config(config)?;
    state.relay.registry().log_providers();

    if let Some(store) = state.relay.artifacts() {
        tokio::fs::create_dir_all(store.dir())
            .await
            .with_context(|| format!("Failed to create artifact dir {}", store.dir().display()))?;
        tracing::info!(
            dir = %store.dir().display(),
            url_prefix = %store.url_prefix(),
            "Artifact store enabled"
        );
    }

    let app = router(Arc::new(state));

    tracing::info!("Starting inference relay on {}", addr);
    tracing::info!("Relay API: /chat, /generate_image (/image), /modify_image (/image_modify)");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

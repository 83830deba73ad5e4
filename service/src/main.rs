//! `snsdiag-service` entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use snsdiag_service::{Backends, DiagnosisService, ServiceConfig, build_router};
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(name = "snsdiag-service", version, about = "SNS diagnosis intake service")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Socket address to bind (overrides config and SNSDIAG_LISTEN)
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref()).context("loading config")?;
    config
        .apply_env_overrides()
        .context("applying environment overrides")?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    config.validate().context("validating config")?;

    tracing::info!(
        "snsdiag-service v{} starting (mode: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.mode
    );

    let listen = config.server.listen.clone();
    let backends = Arc::new(Backends::new(config));

    // Open the store up front so a bad path fails at startup.
    backends
        .store()
        .await
        .context("opening document store")?;

    let app = build_router(DiagnosisService::new(backends));
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("snsdiag-service exiting cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("signal received, shutting down");
}

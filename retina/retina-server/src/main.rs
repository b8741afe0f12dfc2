//! `retina-server` binary.

use anyhow::{Context, anyhow};
use clap::Parser;
use retina_inference::load_classifier;
use retina_server::{AppState, Cli, ServerConfig, app, init_tracing};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config().context("invalid configuration")?;
    init_tracing(&config.server.log_level).map_err(|e| anyhow!(e))?;

    if let Err(e) = run(config).await {
        error!(error = %format!("{e:#}"), "server failed to start");
        return Err(e);
    }
    Ok(())
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    info!(
        weights = %config.model.weights.display(),
        backend = %config.model.backend,
        "loading model"
    );
    let model = config.model.clone();
    let classifier = tokio::task::spawn_blocking(move || {
        load_classifier(model.backend, &model.architecture, &model.weights)
    })
    .await?
    .context("failed to load model weights")?;

    let router = app(AppState::new(classifier), &config)?;
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, origin = %config.server.allowed_origin, "retina-server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("retina-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

use std::sync::Arc;

use anyhow::Result;
use gpudash_benchmark::detect_gpu_backend;
use gpudash_core::GpuDashConfig;
use gpudash_server::{app, AppState, BroadcastLoop};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = GpuDashConfig::from_env()?;
    let state = Arc::new(AppState::new(&config, detect_gpu_backend()));

    let shutdown = CancellationToken::new();
    let broadcaster = BroadcastLoop::new(state.metrics.clone(), state.events.clone(), &config.broadcast)
        .spawn(shutdown.clone());

    let addr = config.server.addr();
    info!("Starting server on {}", addr);
    info!("Serving static files from {}", config.server.static_dir.display());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state, &config.server.static_dir))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = broadcaster.await {
        warn!("Broadcast loop ended abnormally: {}", e);
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        return shutdown.cancelled().await;
    }
    info!("Shutdown requested");
    shutdown.cancel();
}

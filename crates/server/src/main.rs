use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convertino_core::{load_config, validate_config, FfmpegTool, JobQueue};
use convertino_server::api::{
    create_router, spawn_event_relay, spawn_heartbeat, ws::HEARTBEAT_INTERVAL, WsBroadcaster,
};
use convertino_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("CONVERTINO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Convertino {} loading configuration from {:?}", VERSION, config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("FFmpeg path: {:?}", config.tool.ffmpeg_path);
    info!("Hardware encoder: {}", config.tool.hardware_encoder);

    let addr = SocketAddr::new(config.server.host, config.server.port);

    let tool = Arc::new(FfmpegTool::new(config.tool.clone()));
    let queue = JobQueue::new(tool, Arc::new(config));

    // Probe in the background so the API is reachable while the synthetic
    // encode runs.
    let probe_queue = queue.clone();
    tokio::spawn(async move {
        match probe_queue.probe_capability().await {
            Ok(report) => info!(
                available = report.available,
                encoder = %report.encoder,
                "Startup capability probe: {}",
                report.diagnostic
            ),
            Err(e) => warn!("Startup capability probe skipped: {}", e),
        }
    });

    let ws_broadcaster = WsBroadcaster::default();
    let relay = spawn_event_relay(&queue, ws_broadcaster.clone());
    let heartbeat = spawn_heartbeat(ws_broadcaster.clone(), HEARTBEAT_INTERVAL);

    let state = Arc::new(AppState::new(queue.clone(), ws_broadcaster));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let shutdown_queue = queue.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown requested");
            if shutdown_queue.cancel_all().await {
                info!("Active batch cancelled");
            }
        })
        .await
        .context("Server error")?;

    heartbeat.abort();
    relay.abort();
    info!("Server stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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

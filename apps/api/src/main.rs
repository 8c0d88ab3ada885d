//! # Postcraft API
//!
//! HTTP server for checkout pricing and scheduled post delivery.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Postcraft API Server                           │
//! │                                                                         │
//! │  Checkout UI ──► /api/* ──────► pricing engine ───► SQLite             │
//! │                                                        ▲                │
//! │  Cron ─────────► /internal/dispatch ──► Dispatcher ────┘                │
//! │                                             │                           │
//! │                                             ▼                           │
//! │                                        LinkedIn API                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use postcraft_api::{build_router, ApiConfig, AppState};
use postcraft_db::{Database, DbConfig};
use postcraft_dispatch::{
    Dispatcher, DispatcherConfig, LinkedInPublisher, MockPublisher, SocialPublisher,
    TracingNotifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,postcraft=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Postcraft API server...");

    let config = ApiConfig::load().context("loading API configuration")?;
    info!(
        port = config.http_port,
        database = %config.database_path.display(),
        "Configuration loaded"
    );

    let db = Database::new(
        DbConfig::new(&config.database_path).max_connections(config.db_max_connections),
    )
    .await
    .context("opening database")?;

    let dispatch_config = DispatcherConfig::load(config.dispatch_config_path.clone())
        .context("loading dispatcher configuration")?;

    let publisher: Arc<dyn SocialPublisher> = if config.mock_publisher {
        warn!("Using the mock publisher; nothing will reach LinkedIn");
        Arc::new(MockPublisher::new())
    } else {
        Arc::new(LinkedInPublisher::new(&dispatch_config.linkedin)?)
    };

    let dispatcher = Dispatcher::new(db.clone(), publisher, dispatch_config)
        .with_notifier(Arc::new(TracingNotifier));

    let state = AppState::new(db.clone(), dispatcher, config.dispatch_secret.as_str());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

//! Race Controller
//!
//! Serves the station pages, the race/driver CRUD API and the WebSocket
//! event channel from one listener (default: 0.0.0.0:3000).
//!
//! Passing `dev` as the first argument is the same as `RC_DEV_MODE=true`.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Open the race store (SQLite when `RC_DATABASE_URL` is set)
//! 4. Spawn the race session actor
//! 5. Bind the listener, then serve
//! 6. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use race_controller::actors::{RaceSessionActor, SessionSettings};
use race_controller::config::Config;
use race_controller::directory::RaceDirectory;
use race_controller::middleware::SessionStore;
use race_controller::observability::health::HealthState;
use race_controller::observability::metrics::init_metrics_recorder;
use race_controller::routes::{build_routes, AppState};
use race_controller::store::{MemoryRaceStore, RaceStore, SqliteRaceStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long the session actor gets to close connections on shutdown.
const ACTOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "race_controller=debug,rc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Race Controller");

    let mut vars: HashMap<String, String> = env::vars().collect();
    if env::args().nth(1).as_deref() == Some("dev") {
        vars.insert("RC_DEV_MODE".to_string(), "true".to_string());
    }

    // Load configuration
    let config = Config::from_vars(&vars).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if config.dev_mode {
        warn!("Running in dev mode: role checks are disabled");
    }

    info!(
        bind_address = %config.bind_address,
        dev_mode = config.dev_mode,
        race_duration_seconds = config.race_duration(),
        static_dir = %config.static_dir.display(),
        persistent_store = config.database_url.is_some(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let store: Arc<dyn RaceStore> = match &config.database_url {
        Some(url) => {
            info!("Opening SQLite race store...");
            let store = SqliteRaceStore::connect(url).await.map_err(|e| {
                error!(error = %e, "Failed to open race store");
                e
            })?;
            Arc::new(store)
        }
        None => {
            info!("Using in-memory race store");
            Arc::new(MemoryRaceStore::new())
        }
    };

    let shutdown_token = CancellationToken::new();

    let (session, session_task) = RaceSessionActor::spawn(
        RaceDirectory::new(store),
        SessionSettings::from(&config),
        shutdown_token.child_token(),
    );

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let state = Arc::new(AppState {
        config,
        session,
        sessions: Arc::new(SessionStore::new()),
        cancel_token: shutdown_token.child_token(),
    });
    let app = build_routes(Arc::clone(&state), metrics_handle, Arc::clone(&health_state));

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind listener");
        format!("Failed to bind {addr}: {e}")
    })?;
    info!(addr = %addr, "Listener bound successfully");

    let server_token = shutdown_token.child_token();
    let server = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_token.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    health_state.set_ready();
    info!(addr = %addr, "Race Controller running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();

    // Closes every WebSocket, stops the countdown, then the server drains.
    shutdown_token.cancel();

    if tokio::time::timeout(ACTOR_SHUTDOWN_TIMEOUT, session_task)
        .await
        .is_err()
    {
        warn!("Race session actor did not stop in time");
    }

    if let Err(e) = server.await {
        warn!(error = %e, "HTTP server task ended abnormally");
    }

    info!("Race Controller shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

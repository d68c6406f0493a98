//! Axum API server binary.

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vsplit_api::{create_router, ApiConfig, AppState};
use vsplit_engine::{EngineConfig, SessionReaper};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vsplit=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vsplit-api");

    let config = ApiConfig::from_env();
    let engine_config = EngineConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    if vsplit_media::check_ffmpeg().is_err() {
        error!("ffmpeg not found on PATH; split jobs will fail until it is installed");
    }

    let state = match AppState::new(config.clone(), engine_config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {}", e);
            std::process::exit(1);
        }
    };

    // Start the session reaper background task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = SessionReaper::new(std::sync::Arc::clone(&state.registry), engine_config);
    tokio::spawn(reaper.run(shutdown_rx));

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    let _ = shutdown_tx.send(true);
    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}

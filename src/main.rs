//! # Audio Relay - Main Application Entry Point
//!
//! A small web service that turns a video page URL into a downloadable audio file.
//! The browser submits a form, the server looks up the video's title, runs an external
//! extractor (`yt-dlp` by default) and streams its stdout straight back as the response.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every request runs as its own task; the copy from extractor to client
//!   only wakes up when there is data to move
//! - **modules**: the download pipeline lives in `pipeline/`, one module per stage
//! - **Result<T, E>**: startup errors bubble up with `?` and stop the process
//! - **Drop**: a client hanging up drops the response body, which kills the extractor
//!
//! ## Application Architecture:
//! - **config**: settings from defaults, `config.toml` and `APP_` environment variables
//! - **state**: read-only state shared by all workers
//! - **pipeline**: validate → title → sanitize → process → relay
//! - **handlers**: `GET /` (form) and `POST /download`
//! - **middleware**: request logging
//! - **error**: error types and their HTTP responses

mod config;
mod error;
mod handlers;
mod middleware;
mod pipeline;
mod state;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Builds the shared state** (HTTP client for title lookups, extractor settings)
/// 4. **Starts the HTTP server** with the route table and middleware
/// 5. **Stops gracefully** on SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-relay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        program = %config.extractor.program,
        format = %config.extractor.format,
        "Extractor configured"
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config)?;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(Logger::default())
            .wrap(middleware::RequestLogging)
            .configure(handlers::routes)
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            // In-flight downloads are dropped, which kills their extractors.
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: e.g. "debug", "audio_relay=trace"
/// - If not set, defaults to "audio_relay=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_relay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on the first SIGINT (Ctrl+C) or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

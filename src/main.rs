//! # Storybook Backend - Main Application Entry Point
//!
//! HTTP server that turns a one-line prompt into a children's picture book:
//! story text, watercolor illustrations and narrated audio, all generated by
//! the Gemini API and returned as JSON with data URIs.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared state: config, Gemini client, story pipeline, metrics
//! - **gemini**: Upstream API client with retries and a typed response boundary
//! - **story**: Story parsing and page fan-out
//! - **audio**: PCM → WAV encoding for narration
//! - **handlers** / **health**: HTTP endpoints
//! - **middleware**: Request logging and metrics
//! - **error**: Error types and their HTTP responses
//!
//! ## Request Flow:
//! 1. `RequestLogging` assigns a request id and logs the start
//! 2. `MetricsMiddleware` times the request against its route pattern
//! 3. CORS headers are applied
//! 4. The handler validates the JSON body and calls into `StoryService` or
//!    `GeminiClient`; any `AppError` becomes a JSON error response
//! 5. Metrics are recorded, the request id is echoed, completion is logged
//!
//! ## Shutdown:
//! actix's own signal handling is disabled. `shutdown_signal` waits for Ctrl+C
//! or SIGTERM and then stops the server gracefully, letting in-flight story
//! requests finish (they can take a while: one text call plus two upstream
//! calls per page).

mod audio;
mod config;
mod error;
mod gemini;
mod handlers;
mod health;
mod middleware;
mod state;
mod story;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting storybook-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        text_model = %config.gemini.text_model,
        image_model = %config.gemini.image_model,
        tts_model = %config.gemini.tts_model,
        pages = config.story.page_count,
        policy = ?config.story.page_failure_policy,
        "Upstream models configured"
    );
    if !config.gemini.has_api_key() {
        warn!("GEMINI_API_KEY not set; generation endpoints will fail until it is configured");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config)?;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Registered last runs first: logging sees the final response
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::configure_routes)
            .default_service(web::to(handlers::not_found))
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging, filtered by `RUST_LOG`.
///
/// Defaults to `storybook_backend=debug,actix_web=info` when `RUST_LOG` is unset.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storybook_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => {}
    }
}

//! # HTTP Handlers
//!
//! ## Available Endpoints:
//! - `POST /api/generate` - Full story with illustrations and narration
//! - `POST /api/image` - One illustration
//! - `POST /api/tts` - One narration clip as WAV
//! - `GET /api/v1/config` - Running configuration (API key masked)
//!
//! The three generation routes answer any other method with 405.

pub mod config;
pub mod media;
pub mod story;

pub use config::*;
pub use media::*;
pub use story::*;

use crate::error::AppError;
use crate::health;
use actix_web::{web, HttpRequest};

/// Largest JSON request body accepted; prompts and page text are short.
const MAX_JSON_PAYLOAD: usize = 64 * 1024;

/// Register every route. Shared by `main` and the handler tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(MAX_JSON_PAYLOAD)
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .service(
                web::resource("/generate")
                    .route(web::post().to(generate_story))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/image")
                    .route(web::post().to(generate_image))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/tts")
                    .route(web::post().to(synthesize_speech))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::scope("/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(get_config)),
            ),
    )
    .route("/health", web::get().to(health::health_check));
}

pub async fn method_not_allowed() -> Result<actix_web::HttpResponse, AppError> {
    Err(AppError::MethodNotAllowed("Method not allowed".to_string()))
}

pub async fn not_found(req: HttpRequest) -> Result<actix_web::HttpResponse, AppError> {
    Err(AppError::NotFound(format!("No route for {}", req.path())))
}

/// Treat a missing, empty or whitespace-only field the same way.
pub(crate) fn required_field(value: Option<String>, message: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError(message.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::AppConfig;
    use crate::state::AppState;
    use wiremock::MockServer;

    /// State whose Gemini client talks to the given mock server.
    pub fn state_for(server: &MockServer, configure: impl FnOnce(&mut AppConfig)) -> AppState {
        let mut config = AppConfig::default();
        config.gemini.api_key = "test-key".to_string();
        config.gemini.base_url = server.uri();
        config.retry.max_attempts = 1;
        configure(&mut config);
        AppState::new(config).unwrap()
    }
}

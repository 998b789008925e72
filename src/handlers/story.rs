use super::required_field;
use crate::{error::AppError, middleware::RequestId, state::AppState};
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct GenerateStoryRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Generate a complete illustrated, narrated story.
///
/// ## Endpoint: `POST /api/generate`
///
/// ## Request:
/// ```json
/// { "prompt": "a shy dragon who learns to dance" }
/// ```
///
/// ## Response:
/// ```json
/// {
///   "story": {
///     "title": "...",
///     "pages": [
///       { "page_number": 1, "text": "...", "image_prompt": "...",
///         "imageUrl": "data:image/png;base64,...", "audioUrl": "data:audio/wav;base64,..." }
///     ]
///   }
/// }
/// ```
pub async fn generate_story(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<GenerateStoryRequest>,
) -> Result<HttpResponse, AppError> {
    let prompt = required_field(body.into_inner().prompt, "Story prompt is required")?;

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    info!(request_id = %request_id, prompt_len = prompt.len(), "Story requested");

    let story = state.stories.generate(&prompt).await?;

    Ok(HttpResponse::Ok().json(json!({ "story": story })))
}

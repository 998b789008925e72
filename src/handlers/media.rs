//! Single-asset endpoints: one illustration or one narration clip.

use super::required_field;
use crate::{audio::wav_data_uri, error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// ## Endpoint: `POST /api/image`
///
/// Body `{"prompt": "..."}`, answers `{"imageUrl": "data:image/png;base64,..."}`.
pub async fn generate_image(
    state: web::Data<AppState>,
    body: web::Json<ImageRequest>,
) -> Result<HttpResponse, AppError> {
    let prompt = required_field(body.into_inner().prompt, "Prompt required")?;

    let image = state.gemini.generate_image(&prompt).await?;

    Ok(HttpResponse::Ok().json(json!({ "imageUrl": image.data_uri() })))
}

/// ## Endpoint: `POST /api/tts`
///
/// Body `{"text": "..."}`, answers `{"audioUrl": "data:audio/wav;base64,..."}`.
/// The upstream PCM is wrapped in a WAV header before it is returned.
pub async fn synthesize_speech(
    state: web::Data<AppState>,
    body: web::Json<SpeechRequest>,
) -> Result<HttpResponse, AppError> {
    let text = required_field(body.into_inner().text, "Text required")?;

    let inline = state.gemini.synthesize_speech(&text).await?;
    let pcm = inline.to_pcm()?;
    debug!(
        samples = pcm.samples.len(),
        sample_rate = pcm.sample_rate,
        "Encoding narration as WAV"
    );

    Ok(HttpResponse::Ok().json(json!({ "audioUrl": wav_data_uri(&pcm.encode_wav()) })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{configure_routes, test_support::state_for};
    use actix_web::{http::StatusCode, test, App};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use wiremock::matchers::{body_string_contains, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[actix_web::test]
    async fn test_generate_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":predict$"))
            .and(body_string_contains("vibrant watercolor style, a red kite"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{ "bytesBase64Encoded": "iVBORw0KGgo=" }]
            })))
            .mount(&server)
            .await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_for(&server, |_| {})))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/image")
            .set_json(json!({ "prompt": "a red kite" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["imageUrl"], "data:image/png;base64,iVBORw0KGgo=");
    }

    #[actix_web::test]
    async fn test_image_without_predictions_is_502() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_for(&server, |_| {})))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/image")
            .set_json(json!({ "prompt": "a red kite" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Imagen failed to return image data");
    }

    #[actix_web::test]
    async fn test_tts_returns_wav() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"-tts:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{
                    "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AAD/fwCA" }
                }] } }]
            })))
            .mount(&server)
            .await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_for(&server, |_| {})))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/tts")
            .set_json(json!({ "text": "The dragon danced." }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        let uri = body["audioUrl"].as_str().unwrap();
        let wav = STANDARD
            .decode(uri.strip_prefix("data:audio/wav;base64,").unwrap())
            .unwrap();

        assert_eq!(wav.len(), 50);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[24..28], &[0xC0, 0x5D, 0x00, 0x00]);
        assert_eq!(&wav[44..50], &[0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80]);
    }

    #[actix_web::test]
    async fn test_tts_missing_text_is_400() {
        let server = MockServer::start().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_for(&server, |_| {})))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/tts").set_json(json!({})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Text required");
    }
}

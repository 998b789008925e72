//! Gemini HTTP client.
//!
//! One POST per operation against `{base_url}/models/{model}:{method}?key=...`,
//! wrapped in a fixed-count exponential backoff. The API key only ever lives
//! in the request URL, which is never logged.

use super::types::{
    Content, GeneratedImage, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    ImageInstance, ImageParameters, InlineData, PredictRequest, PredictResponse, SpeechConfig,
};
use super::GeminiError;
use crate::config::{GeminiConfig, RetryConfig};
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const STORY_SYSTEM_PROMPT: &str = "You are an expert children's book author.";
const ILLUSTRATION_STYLE: &str = "Children's storybook illustration, vibrant watercolor style";

/// Upper bound on a single backoff delay, whatever the multiplier.
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Longest slice of an upstream error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Counters for calls made to the upstream API.
#[derive(Debug, Default)]
pub struct UpstreamStats {
    calls: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of [`UpstreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct UpstreamStatsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub retries: u64,
}

impl UpstreamStats {
    pub fn snapshot(&self) -> UpstreamStatsSnapshot {
        UpstreamStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Client for the three Gemini endpoints the story service uses.
pub struct GeminiClient {
    config: GeminiConfig,
    retry: RetryConfig,
    client: Client,
    stats: UpstreamStats,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, retry: RetryConfig) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GeminiError::NotConfigured(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            retry,
            client,
            stats: UpstreamStats::default(),
        })
    }

    pub fn stats(&self) -> UpstreamStatsSnapshot {
        self.stats.snapshot()
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method,
            self.config.api_key
        )
    }

    /// Ask the text model for a story as JSON with `title` and `pages`.
    ///
    /// Returns the raw model text; the caller owns parsing it.
    pub async fn generate_story(&self, prompt: &str, page_count: usize) -> Result<String, GeminiError> {
        let system_prompt = format!(
            "{} Generate a {}-page story with text and image prompts in JSON. \
             Respond with an object containing a \"title\" string and a \"pages\" array; \
             each page has \"page_number\", \"text\" and \"image_prompt\".",
            STORY_SYSTEM_PROMPT, page_count
        );

        let request = GenerateContentRequest {
            contents: vec![Content::text(format!(
                "Create a {}-page story for a child about: {}",
                page_count, prompt
            ))],
            system_instruction: Some(Content::text(system_prompt)),
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                ..Default::default()
            }),
        };

        let response: GenerateContentResponse = self
            .post_json(&self.config.text_model, "generateContent", &request)
            .await?;

        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| match response.finish_reason() {
                Some(reason) => GeminiError::InvalidResponse(format!(
                    "Gemini did not return story text (finish reason: {})",
                    reason
                )),
                None => GeminiError::InvalidResponse("Gemini did not return story text".to_string()),
            })
    }

    /// Generate one watercolor illustration for the given scene description.
    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, GeminiError> {
        let request = PredictRequest {
            instances: vec![ImageInstance {
                prompt: format!("{}, {}", ILLUSTRATION_STYLE, prompt),
            }],
            parameters: ImageParameters {
                sample_count: 1,
                aspect_ratio: "16:9".to_string(),
            },
        };

        let response: PredictResponse = self
            .post_json(&self.config.image_model, "predict", &request)
            .await?;

        response
            .first_image()
            .ok_or_else(|| GeminiError::InvalidResponse("Imagen failed to return image data".to_string()))
    }

    /// Narrate `text` with the configured prebuilt voice. The audio comes back as PCM.
    pub async fn synthesize_speech(&self, text: &str) -> Result<InlineData, GeminiError> {
        let request = GenerateContentRequest {
            contents: vec![Content::text(format!(
                "Read in a cheerful, friendly voice for a children's story: \"{}\"",
                text
            ))],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::prebuilt(self.config.voice_name.clone())),
                ..Default::default()
            }),
        };

        let response: GenerateContentResponse = self
            .post_json(&self.config.tts_model, "generateContent", &request)
            .await?;

        response
            .first_inline_data()
            .cloned()
            .ok_or_else(|| GeminiError::InvalidResponse("TTS failed to generate audio data".to_string()))
    }

    /// POST with retries. Only errors that [`GeminiError::is_retryable`] allows
    /// are attempted again, up to `retry.max_attempts` attempts in total.
    async fn post_json<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R, GeminiError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        if !self.config.has_api_key() {
            return Err(GeminiError::NotConfigured("GEMINI_API_KEY not set".to_string()));
        }

        let mut schedule = ExponentialBackoff {
            initial_interval: self.retry.initial_interval(),
            randomization_factor: 0.0,
            multiplier: self.retry.multiplier,
            max_interval: MAX_RETRY_INTERVAL,
            max_elapsed_time: None,
            ..Default::default()
        };
        schedule.reset();

        let mut attempt = 1;
        loop {
            self.stats.calls.fetch_add(1, Ordering::Relaxed);

            match self.send_once(model, method, body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);

                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        warn!(model = %model, method = %method, attempt, error = %err, "Gemini request failed");
                        return Err(err);
                    }

                    let delay = schedule.next_backoff().unwrap_or(MAX_RETRY_INTERVAL);
                    warn!(
                        model = %model,
                        method = %method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Gemini request failed, retrying"
                    );
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R, GeminiError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        debug!(model = %model, method = %method, "Sending request to Gemini API");

        let response = self
            .client
            .post(self.api_url(model, method))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message: error_text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        debug!(model = %model, method = %method, status = status.as_u16(), "Gemini API responded");

        response
            .json::<R>()
            .await
            .map_err(|e| GeminiError::InvalidResponse(format!("Failed to parse {} response: {}", model, e.without_url())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_attempts: u32) -> GeminiClient {
        let mut config = AppConfig::default();
        config.gemini.api_key = "test-key".to_string();
        config.gemini.base_url = server.uri();
        config.retry.max_attempts = max_attempts;
        config.retry.initial_interval_ms = 1;
        GeminiClient::new(config.gemini, config.retry).unwrap()
    }

    fn text_model_path() -> String {
        format!("/models/{}:generateContent", AppConfig::default().gemini.text_model)
    }

    #[tokio::test]
    async fn test_generate_story_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(text_model_path()))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [{ "text": "Create a 5-page story for a child about: a brave turtle" }] }],
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "{\"title\":\"Shelly\"}" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let text = client.generate_story("a brave turtle", 5).await.unwrap();

        assert_eq!(text, "{\"title\":\"Shelly\"}");
        assert_eq!(client.stats(), UpstreamStatsSnapshot { calls: 1, failures: 0, retries: 0 });
    }

    #[tokio::test]
    async fn test_missing_story_text_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server, 3).generate_story("x", 5).await.unwrap_err();
        assert_eq!(err, GeminiError::InvalidResponse("Gemini did not return story text".to_string()));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_up_to_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let err = client.generate_image("a turtle").await.unwrap_err();

        assert_eq!(err, GeminiError::Api { status: 503, message: "overloaded".to_string() });
        assert_eq!(client.stats(), UpstreamStatsSnapshot { calls: 3, failures: 3, retries: 2 });
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{ "bytesBase64Encoded": "iVBORw0KGgo=", "mimeType": "image/png" }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let image = client.generate_image("a turtle").await.unwrap();

        assert_eq!(image.data_uri(), "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(client.stats().retries, 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad prompt"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, 5).synthesize_speech("hi").await.unwrap_err();
        assert!(matches!(err, GeminiError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_synthesize_speech_sends_voice_and_returns_inline_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{}:generateContent", AppConfig::default().gemini.tts_model)))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": { "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Puck" } } }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{
                    "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AAD/fwCA" }
                }] } }]
            })))
            .mount(&server)
            .await;

        let inline = client_for(&server, 1).synthesize_speech("Once upon a time").await.unwrap();
        assert_eq!(inline.mime_type, "audio/L16;codec=pcm;rate=24000");
        assert_eq!(inline.data, "AAD/fwCA");
    }

    #[tokio::test]
    async fn test_missing_api_key_short_circuits() {
        let server = MockServer::start().await;
        let mut config = AppConfig::default();
        config.gemini.base_url = server.uri();
        let client = GeminiClient::new(config.gemini, config.retry).unwrap();

        let err = client.generate_image("x").await.unwrap_err();
        assert_eq!(err, GeminiError::NotConfigured("GEMINI_API_KEY not set".to_string()));
        assert_eq!(client.stats().calls, 0);
    }
}

//! Story generation pipeline.
//!
//! ## Flow:
//! 1. Text model writes the story JSON
//! 2. Parse and check the page count
//! 3. Render pages concurrently (at most `max_concurrency` at a time); each page
//!    runs its illustration and narration calls side by side
//! 4. Attach results by page index
//!
//! What happens when a page fails is decided by `PageFailurePolicy`.

use super::model::{parse_story, Story};
use crate::audio::wav_data_uri;
use crate::config::{PageFailurePolicy, StoryConfig};
use crate::error::{AppError, AppResult};
use crate::gemini::{GeminiClient, GeminiError};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Illustration and narration results for one page.
struct RenderedPage {
    index: usize,
    page_number: u32,
    image: Result<String, GeminiError>,
    audio: Result<String, GeminiError>,
}

/// Generates complete stories through the Gemini client.
#[derive(Clone)]
pub struct StoryService {
    gemini: Arc<GeminiClient>,
    config: StoryConfig,
}

impl StoryService {
    pub fn new(gemini: Arc<GeminiClient>, config: StoryConfig) -> Self {
        Self { gemini, config }
    }

    /// Write, illustrate and narrate a story about `prompt`.
    pub async fn generate(&self, prompt: &str) -> AppResult<Story> {
        let start_time = Instant::now();

        let text = self.gemini.generate_story(prompt, self.config.page_count).await?;
        let expected_pages = self.config.enforce_page_count.then_some(self.config.page_count);
        let mut story = parse_story(&text, expected_pages)?;

        info!(title = %story.title, pages = story.pages.len(), "Story text generated");

        self.render_pages(&mut story).await?;

        info!(
            title = %story.title,
            pages = story.pages.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Story generated"
        );

        Ok(story)
    }

    async fn render_pages(&self, story: &mut Story) -> AppResult<()> {
        let inputs: Vec<(usize, u32, String, String)> = story
            .pages
            .iter()
            .enumerate()
            .map(|(index, page)| (index, page.number(index), page.image_prompt.clone(), page.text.clone()))
            .collect();

        let mut rendered = stream::iter(inputs)
            .map(|(index, page_number, image_prompt, text)| async move {
                let (image, audio) = futures_util::future::join(
                    self.illustrate(&image_prompt),
                    self.narrate(&text),
                )
                .await;
                RenderedPage { index, page_number, image, audio }
            })
            .buffer_unordered(self.config.max_concurrency.max(1));

        while let Some(result) = rendered.next().await {
            let page = &mut story.pages[result.index];

            page.image_url = self.settle(result.image, "Image generation", result.page_number)?;
            page.audio_url = self.settle(result.audio, "Narration", result.page_number)?;
        }

        Ok(())
    }

    /// Apply the failure policy to one media result.
    fn settle(
        &self,
        result: Result<String, GeminiError>,
        what: &str,
        page_number: u32,
    ) -> AppResult<Option<String>> {
        match result {
            Ok(uri) => Ok(Some(uri)),
            Err(err) => match self.config.page_failure_policy {
                PageFailurePolicy::Abort => Err(AppError::Upstream(format!(
                    "{} failed for page {}: {}",
                    what, page_number, err
                ))),
                PageFailurePolicy::Skip => {
                    warn!(page = page_number, error = %err, "{} failed, leaving page media empty", what);
                    Ok(None)
                }
            },
        }
    }

    async fn illustrate(&self, image_prompt: &str) -> Result<String, GeminiError> {
        let image = self.gemini.generate_image(image_prompt).await?;
        Ok(image.data_uri())
    }

    async fn narrate(&self, text: &str) -> Result<String, GeminiError> {
        let pcm = self.gemini.synthesize_speech(text).await?.to_pcm()?;
        Ok(wav_data_uri(&pcm.encode_wav()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMAGE_B64: &str = "iVBORw0KGgo=";

    fn story_text(pages: usize) -> String {
        let pages: Vec<_> = (1..=pages)
            .map(|n| json!({ "page_number": n, "text": format!("text {}", n), "image_prompt": format!("scene {}", n) }))
            .collect();
        json!({ "title": "Moon Picnic", "pages": pages }).to_string()
    }

    async fn mount_story(server: &MockServer, config: &AppConfig, pages: usize) {
        Mock::given(method("POST"))
            .and(path(format!("/models/{}:generateContent", config.gemini.text_model)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": format!("```json\n{}\n```", story_text(pages)) }] } }]
            })))
            .mount(server)
            .await;
    }

    async fn mount_tts(server: &MockServer, config: &AppConfig) {
        Mock::given(method("POST"))
            .and(path(format!("/models/{}:generateContent", config.gemini.tts_model)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{
                    "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AAD/fwCA" }
                }] } }]
            })))
            .mount(server)
            .await;
    }

    fn image_path(config: &AppConfig) -> String {
        format!("/models/{}:predict", config.gemini.image_model)
    }

    fn service_for(server: &MockServer, policy: PageFailurePolicy) -> (StoryService, AppConfig) {
        service_with_concurrency(server, policy, AppConfig::default().story.max_concurrency)
    }

    fn service_with_concurrency(
        server: &MockServer,
        policy: PageFailurePolicy,
        max_concurrency: usize,
    ) -> (StoryService, AppConfig) {
        let mut config = AppConfig::default();
        config.story.max_concurrency = max_concurrency;
        config.gemini.api_key = "test-key".to_string();
        config.gemini.base_url = server.uri();
        config.retry.max_attempts = 1;
        config.story.page_failure_policy = policy;

        let gemini = Arc::new(GeminiClient::new(config.gemini.clone(), config.retry.clone()).unwrap());
        (StoryService::new(gemini, config.story.clone()), config)
    }

    #[tokio::test]
    async fn test_generate_full_story() {
        let server = MockServer::start().await;
        let (service, config) = service_for(&server, PageFailurePolicy::Abort);
        mount_story(&server, &config, 5).await;
        mount_tts(&server, &config).await;
        Mock::given(method("POST"))
            .and(path(image_path(&config)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{ "bytesBase64Encoded": IMAGE_B64 }]
            })))
            .expect(5)
            .mount(&server)
            .await;

        let story = service.generate("a picnic on the moon").await.unwrap();

        assert_eq!(story.title, "Moon Picnic");
        assert_eq!(story.pages.len(), 5);
        for page in &story.pages {
            assert_eq!(page.image_url.as_deref(), Some("data:image/png;base64,iVBORw0KGgo="));
            // 44-byte header + 3 samples, base64 encoded
            let audio = page.audio_url.as_deref().unwrap();
            assert!(audio.starts_with("data:audio/wav;base64,UklGR"));
        }
    }

    #[tokio::test]
    async fn test_abort_policy_fails_whole_story() {
        let server = MockServer::start().await;
        let (service, config) = service_for(&server, PageFailurePolicy::Abort);
        mount_story(&server, &config, 5).await;
        mount_tts(&server, &config).await;
        Mock::given(method("POST"))
            .and(path(image_path(&config)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "predictions": [] })))
            .mount(&server)
            .await;

        let err = service.generate("a picnic").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
        assert!(err.message().starts_with("Image generation failed for page"));
    }

    #[tokio::test]
    async fn test_skip_policy_nulls_failed_media() {
        let server = MockServer::start().await;
        let (service, config) = service_for(&server, PageFailurePolicy::Skip);
        mount_story(&server, &config, 5).await;
        mount_tts(&server, &config).await;
        Mock::given(method("POST"))
            .and(path(image_path(&config)))
            .and(body_string_contains("scene 3"))
            .respond_with(ResponseTemplate::new(400).set_body_string("blocked"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(image_path(&config)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{ "bytesBase64Encoded": IMAGE_B64 }]
            })))
            .mount(&server)
            .await;

        let story = service.generate("a picnic").await.unwrap();

        assert!(story.pages[2].image_url.is_none());
        assert!(story.pages[2].audio_url.is_some());
        assert!(story.pages[0].image_url.is_some());
        assert!(story.pages[4].image_url.is_some());
    }

    #[tokio::test]
    async fn test_wrong_page_count_is_upstream_error() {
        let server = MockServer::start().await;
        let (service, config) = service_for(&server, PageFailurePolicy::Abort);
        mount_story(&server, &config, 3).await;

        let err = service.generate("a picnic").await.unwrap_err();
        assert_eq!(err.message(), "Story has 3 pages, expected 5");
    }

    #[tokio::test]
    async fn test_max_concurrency_one_renders_pages_in_sequence() {
        let server = MockServer::start().await;
        let (service, config) = service_with_concurrency(&server, PageFailurePolicy::Abort, 1);
        mount_story(&server, &config, 5).await;
        mount_tts(&server, &config).await;
        Mock::given(method("POST"))
            .and(path(image_path(&config)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "predictions": [{ "bytesBase64Encoded": IMAGE_B64 }] }))
                    .set_delay(Duration::from_millis(80)),
            )
            .expect(5)
            .mount(&server)
            .await;

        let start = Instant::now();
        let story = service.generate("a picnic").await.unwrap();

        // One page in flight at a time: five image delays back to back
        assert!(start.elapsed() >= Duration::from_millis(400));
        let numbers: Vec<_> = story.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
        assert!(story.pages.iter().all(|p| p.image_url.is_some()));
    }
}

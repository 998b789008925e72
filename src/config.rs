//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! The configuration is loaded once at process start and handed to every
//! handler through `AppState`. Nothing reads the Gemini API key from the
//! environment after startup.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables (HOST, PORT, GEMINI_API_KEY)
//! 2. Environment variables (APP_SERVER__PORT, APP_STORY__PAGE_COUNT, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub story: StoryConfig,
    pub retry: RetryConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream Gemini API settings.
///
/// ## Fields:
/// - `api_key`: Sent as the `key` query parameter; empty means "not configured"
/// - `base_url`: API root, overridable so tests can point at a local mock
/// - `text_model` / `image_model` / `tts_model`: Model ids for the three endpoints
/// - `voice_name`: Prebuilt voice used for narration
/// - `request_timeout_secs`: Per-call timeout for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub voice_name: String,
    pub request_timeout_secs: u64,
}

/// What to do when one page's image or narration fails.
///
/// Deserialized through [`FromStr`](std::str::FromStr), so config files and
/// environment variables accept any casing and `continue` as a synonym for `skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFailurePolicy {
    /// Fail the whole story request on the first page failure
    Abort,
    /// Leave the failed page's media as null and keep going
    Skip,
}

impl std::str::FromStr for PageFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(PageFailurePolicy::Abort),
            "skip" | "continue" => Ok(PageFailurePolicy::Skip),
            _ => Err(format!("Unknown page failure policy: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for PageFailurePolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.trim().parse().map_err(serde::de::Error::custom)
    }
}

/// Story assembly settings.
///
/// ## Fields:
/// - `page_count`: Number of pages requested from the model
/// - `enforce_page_count`: Reject stories whose page count differs
/// - `page_failure_policy`: Abort-all or null-out-and-continue
/// - `max_concurrency`: Pages rendered at once per story (each page runs its
///   illustration and narration calls together)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryConfig {
    pub page_count: usize,
    pub enforce_page_count: bool,
    pub page_failure_policy: PageFailurePolicy,
    pub max_concurrency: usize,
}

/// Fixed-count exponential backoff for upstream calls (no jitter).
///
/// Delay before attempt `n + 1` is `initial_interval_ms * multiplier^(n - 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub multiplier: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            gemini: GeminiConfig {
                api_key: String::new(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                text_model: "gemini-2.5-flash-preview-05-20".to_string(),
                image_model: "imagen-4.0-generate-001".to_string(),
                tts_model: "gemini-2.5-flash-preview-tts".to_string(),
                voice_name: "Puck".to_string(),
                request_timeout_secs: 120,
            },
            story: StoryConfig {
                page_count: 5,
                enforce_page_count: true,
                page_failure_policy: PageFailurePolicy::Abort,
                max_concurrency: 4,
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_interval_ms: 500,
                multiplier: 2.0,
            },
        }
    }
}

impl GeminiConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_STORY__PAGE_FAILURE_POLICY=skip`: Keep going when a page fails
    /// - `APP_RETRY__MAX_ATTEMPTS=5`: More patient upstream retries
    /// - `GEMINI_API_KEY=...`: API key, same variable the deployment platform sets
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore keeps snake_case field names intact
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("GEMINI_API_KEY") {
            settings = settings.set_override("gemini.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// A missing API key is not a startup error: health and config endpoints
    /// still work, and the generation endpoints answer with a config error.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.gemini.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Gemini base URL cannot be empty"));
        }

        if self.gemini.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        if self.story.page_count == 0 {
            return Err(anyhow::anyhow!("Story page count must be greater than 0"));
        }

        if self.story.max_concurrency == 0 {
            return Err(anyhow::anyhow!("Max concurrency must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("Retry max attempts must be at least 1"));
        }

        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(anyhow::anyhow!("Retry multiplier must be at least 1.0"));
        }

        Ok(())
    }

    /// Configuration as JSON with the API key masked, for the config endpoint.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(gemini) = value.get_mut("gemini").and_then(|g| g.as_object_mut()) {
            let masked = if self.gemini.has_api_key() { "********" } else { "" };
            gemini.insert("api_key".to_string(), serde_json::Value::from(masked));
        }
        value
    }
}

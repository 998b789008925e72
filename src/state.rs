//! # Application State Management
//!
//! Shared state handed to every request handler through `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: Loaded once at startup, read-only afterwards, so a plain `Arc`
//! - **gemini** / **stories**: The upstream client and the story pipeline built on it
//! - **metrics**: Request counters updated by the metrics middleware
//!
//! ## Arc<RwLock<T>> Pattern
//! Metrics are written by every request and read by the health endpoints, so
//! they sit behind a reader-writer lock. A poisoned lock only means a handler
//! panicked mid-update; the counters are still usable, so we keep going.

use crate::config::AppConfig;
use crate::gemini::{GeminiClient, GeminiError, UpstreamStatsSnapshot};
use crate::story::StoryService;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed for the life of the process
    pub config: Arc<AppConfig>,

    /// Client for the Gemini API (shared connection pool)
    pub gemini: Arc<GeminiClient>,

    /// Story pipeline built on `gemini`
    pub stories: StoryService,

    /// Performance metrics (updated by every request)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Requests currently being processed
    pub in_flight: u32,

    /// Per-route statistics, keyed like "POST /api/generate"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
    pub max_duration_ms: u64,
}

impl AppState {
    /// Build the state, including the HTTP client for the upstream API.
    pub fn new(config: AppConfig) -> Result<Self, GeminiError> {
        let gemini = Arc::new(GeminiClient::new(config.gemini.clone(), config.retry.clone())?);
        let stories = StoryService::new(gemini.clone(), config.story.clone());

        Ok(Self {
            config: Arc::new(config),
            gemini,
            stories,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        })
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Called by the metrics middleware when a request arrives.
    pub fn request_started(&self) {
        let mut metrics = self.write_metrics();
        metrics.request_count += 1;
        metrics.in_flight += 1;
    }

    /// Called by the metrics middleware when a request finishes, whatever the outcome.
    pub fn request_finished(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        metrics.in_flight = metrics.in_flight.saturating_sub(1);

        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        endpoint_metric.max_duration_ms = endpoint_metric.max_duration_ms.max(duration_ms);

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current metrics, so no lock is held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn upstream_stats(&self) -> UpstreamStatsSnapshot {
        self.gemini.stats()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accounting() {
        let state = AppState::new(AppConfig::default()).unwrap();

        state.request_started();
        state.request_started();
        state.request_finished("POST /api/tts", 40, false);
        state.request_finished("POST /api/tts", 20, true);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.in_flight, 0);
        assert_eq!(metrics.error_rate(), 0.5);

        let tts = &metrics.endpoint_metrics["POST /api/tts"];
        assert_eq!(tts.request_count, 2);
        assert_eq!(tts.max_duration_ms, 40);
        assert_eq!(tts.average_duration_ms(), 30.0);
        assert_eq!(tts.error_rate(), 0.5);
    }

    #[test]
    fn test_in_flight_never_underflows() {
        let state = AppState::new(AppConfig::default()).unwrap();
        state.request_finished("GET /health", 1, false);
        assert_eq!(state.get_metrics_snapshot().in_flight, 0);
    }
}

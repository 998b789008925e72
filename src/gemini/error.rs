use std::fmt;

/// Failures at the Gemini API boundary.
///
/// Everything that goes wrong talking to the upstream ends up here, so the
/// rest of the service only has to decide between "retry" and "report".
#[derive(Debug, Clone, PartialEq)]
pub enum GeminiError {
    /// API key or client setup missing
    NotConfigured(String),

    /// Transport failure: DNS, connect, timeout, reset
    Network(String),

    /// Upstream answered with a non-success status
    Api { status: u16, message: String },

    /// Upstream answered 2xx but the body isn't the shape we expect
    InvalidResponse(String),
}

impl GeminiError {
    /// Transport errors, rate limits and upstream 5xx are worth another attempt.
    /// Everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            GeminiError::Network(_) => true,
            GeminiError::Api { status, .. } => *status == 429 || *status >= 500,
            GeminiError::NotConfigured(_) | GeminiError::InvalidResponse(_) => false,
        }
    }
}

impl fmt::Display for GeminiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeminiError::NotConfigured(msg) => write!(f, "Gemini not configured: {}", msg),
            GeminiError::Network(msg) => write!(f, "Network error: {}", msg),
            GeminiError::Api { status, message } => {
                write!(f, "API request failed with status {}: {}", status, message)
            }
            GeminiError::InvalidResponse(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for GeminiError {}

impl From<reqwest::Error> for GeminiError {
    fn from(err: reqwest::Error) -> Self {
        GeminiError::Network(err.without_url().to_string())
    }
}

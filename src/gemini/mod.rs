//! # Gemini API Module
//!
//! Everything the service knows about the upstream generative API lives here.
//!
//! ## Key Components:
//! - **client**: `GeminiClient` with story, illustration and narration calls plus retries
//! - **types**: Request builders and the typed response parsing boundary
//! - **error**: `GeminiError` and its retry classification

pub mod client;
pub mod error;
pub mod types;

pub use client::{GeminiClient, UpstreamStatsSnapshot};
pub use error::GeminiError;

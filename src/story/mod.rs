//! # Story Assembly
//!
//! Turns one prompt into a finished picture book: the text model writes the
//! story as JSON, then every page gets an illustration and a narration.
//!
//! ## Key Components:
//! - **model**: `Story` / `StoryPage` and the parser for the model's JSON
//! - **service**: `StoryService`, which fans page rendering out to the Gemini client

pub mod model;
pub mod service;

pub use service::StoryService;

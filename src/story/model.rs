//! Story payload and the parser for the text model's output.
//!
//! The model is asked for JSON but is an untrusted source: it wraps output in
//! Markdown fences, renames fields, and sometimes returns the wrong number of
//! pages. Everything it gets wrong becomes an `AppError::Upstream` here.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A generated story, returned to the caller as `{"story": ...}`.
///
/// Fields the model adds beyond `title` and `pages` are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub title: String,

    pub pages: Vec<StoryPage>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of the story.
///
/// `imageUrl` and `audioUrl` are data URIs filled in after generation; they
/// stay `null` when rendering that page was skipped after a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryPage {
    #[serde(
        default,
        alias = "pageNumber",
        alias = "page",
        deserialize_with = "lenient_page_number"
    )]
    pub page_number: Option<u32>,

    pub text: String,

    #[serde(alias = "imagePrompt")]
    pub image_prompt: String,

    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,

    #[serde(rename = "audioUrl", default)]
    pub audio_url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoryPage {
    /// The 1-based page number, falling back to the page's position.
    pub fn number(&self, index: usize) -> u32 {
        self.page_number.unwrap_or(index as u32 + 1)
    }
}

/// Page numbers arrive as `1`, `"1"` or `null` depending on the model's mood.
/// Anything unusable becomes `None` and is numbered by position instead.
fn lenient_page_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Remove Markdown code fences the model likes to wrap JSON in.
fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse the text model's output into a [`Story`].
///
/// With `expected_pages` set, a story with any other number of pages is
/// rejected. Missing page numbers are filled in from position.
pub fn parse_story(text: &str, expected_pages: Option<usize>) -> AppResult<Story> {
    let cleaned = strip_code_fences(text);

    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| AppError::Upstream(format!("Story text is not valid JSON: {}", e)))?;

    if !value.get("pages").map_or(false, Value::is_array) {
        return Err(AppError::Upstream("Story JSON missing pages array".to_string()));
    }

    let mut story: Story = serde_json::from_value(value)
        .map_err(|e| AppError::Upstream(format!("Story JSON has an unexpected shape: {}", e)))?;

    if let Some(expected) = expected_pages {
        if story.pages.len() != expected {
            return Err(AppError::Upstream(format!(
                "Story has {} pages, expected {}",
                story.pages.len(),
                expected
            )));
        }
    }

    for (index, page) in story.pages.iter_mut().enumerate() {
        page.page_number = Some(page.number(index));
    }

    Ok(story)
}

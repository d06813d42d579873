//! Audience-specific rewriting of raw analysis text.
//!
//! The formatter never fails: if the completion call errors or comes back
//! empty, the raw text is returned with a visible advisory note.

mod client;
mod prompt;

use client::ChatMessage;
pub use client::{
    ChatRequest, CompletionClient, OpenAiCompatClient, DEFAULT_BASE_URL,
    DEFAULT_COMPLETION_MODEL,
};
#[cfg(test)]
pub use client::{ChatResponse, Choice, CompletionError};
use prompt::build_prompt;

use std::sync::Arc;

use crate::models::Mode;

/// Appended to raw text when formatting was not possible.
pub const FORMATTING_UNAVAILABLE_NOTE: &str =
    "\n\n[Note: AI processing unavailable, showing raw response]";

/// Rewrites raw analysis output for the audience selected by [`Mode`].
pub struct ResponseFormatter {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl ResponseFormatter {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Format `raw_text` as an answer to `user_query`.
    pub async fn format(
        &self,
        raw_text: &str,
        user_query: &str,
        conversation_context: Option<&str>,
        mode: Mode,
    ) -> String {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(build_prompt(
                raw_text,
                user_query,
                conversation_context,
                mode,
            ))],
        };

        match self.client.complete(&request).await {
            Ok(response) => match response.first_text() {
                Some(text) if !text.trim().is_empty() => text.to_string(),
                _ => {
                    tracing::warn!(model = %self.model, "Completion returned no content, using raw response");
                    fallback(raw_text)
                }
            },
            Err(e) => {
                tracing::warn!(model = %self.model, "Completion failed, using raw response: {e}");
                fallback(raw_text)
            }
        }
    }
}

fn fallback(raw_text: &str) -> String {
    format!("{raw_text}{FORMATTING_UNAVAILABLE_NOTE}")
}

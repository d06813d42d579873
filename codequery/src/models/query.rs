//! Outcome of one orchestrated query.

use serde::{Deserialize, Serialize};

/// Result handed back to the caller of the orchestrator.
///
/// Exactly one of `response` or `error` is set, matching `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn ok(response: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            response: Some(response.into()),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }

    /// Text to show a user: the response, or an apology carrying the error.
    pub fn reply_text(&self) -> String {
        match (&self.response, &self.error) {
            (Some(response), _) if self.success => response.clone(),
            (_, Some(error)) => format!("Sorry, I encountered an error: {error}"),
            _ => "Sorry, I encountered an error: Unknown error".to_string(),
        }
    }
}

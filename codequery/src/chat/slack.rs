//! Slack Web API client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::OnceCell;

const SLACK_API: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API error in {method}: {error}")]
    Api { method: String, error: String },
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// User id of the bot itself, used to strip its mention from messages.
    async fn bot_user_id(&self) -> Result<Option<String>, ChatError>;

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), ChatError>;

    async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<(), ChatError>;

    async fn remove_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<(), ChatError>;
}

/// Common part of every Web API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
    user_id: Option<String>,
}

/// Slack client authenticated with a bot token.
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    bot_user_id: OnceCell<Option<String>>,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, SLACK_API)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            base_url: base_url.into(),
            bot_user_id: OnceCell::new(),
        }
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<ApiResponse, ChatError> {
        let url = format!("{}/{method}", self.base_url.trim_end_matches('/'));
        let response: ApiResponse = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(ChatError::Api {
                method: method.to_string(),
                error: response.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn bot_user_id(&self) -> Result<Option<String>, ChatError> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let response = self.call("auth.test", json!({})).await?;
                Ok(response.user_id)
            })
            .await
            .cloned()
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), ChatError> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }
        self.call("chat.postMessage", body).await?;
        Ok(())
    }

    async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<(), ChatError> {
        self.call(
            "reactions.add",
            json!({ "channel": channel, "timestamp": ts, "name": name }),
        )
        .await?;
        Ok(())
    }

    async fn remove_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<(), ChatError> {
        self.call(
            "reactions.remove",
            json!({ "channel": channel, "timestamp": ts, "name": name }),
        )
        .await?;
        Ok(())
    }
}

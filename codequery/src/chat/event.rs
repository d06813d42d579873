//! Slack event payloads and routing rules.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Outer Events API envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    /// Endpoint verification handshake.
    UrlVerification { challenge: String },
    /// A subscribed event.
    EventCallback { event: ChatEvent },
    /// Anything else (rate limit notices, app lifecycle events).
    #[serde(other)]
    Unknown,
}

/// A chat message event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatEvent {
    /// `app_mention` or `message`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub ts: String,
    pub thread_ts: Option<String>,
    pub channel_type: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
    pub user: Option<String>,
}

/// How a message reached the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The bot was @-mentioned in a channel.
    Mention,
    /// Direct message to the bot.
    DirectMessage,
}

impl EventKind {
    /// Reaction shown while the query runs.
    pub const fn working_reaction(self) -> &'static str {
        match self {
            Self::Mention => "eyes",
            Self::DirectMessage => "hourglass_flowing_sand",
        }
    }

    pub const fn greeting(self) -> &'static str {
        match self {
            Self::Mention => {
                "Hi! I'm ready to help you query the codebase. Just mention me with your question!"
            }
            Self::DirectMessage => {
                "Hi! I'm ready to help you query the codebase. Just send me your question!"
            }
        }
    }
}

impl ChatEvent {
    pub fn is_direct_message(&self) -> bool {
        self.channel_type.as_deref() == Some("im") || self.channel.starts_with('D')
    }

    /// Bot-authored messages and non-plain subtypes (joins, deletes...) are skipped.
    pub fn is_noise(&self) -> bool {
        self.bot_id.is_some()
            || self
                .subtype
                .as_deref()
                .is_some_and(|subtype| subtype != "message_changed")
    }

    /// Decide whether and how the bot should answer this event.
    ///
    /// Channel messages are only answered through `app_mention`, which Slack
    /// delivers separately, so plain `message` events outside DMs are dropped.
    pub fn route(&self) -> Option<EventKind> {
        if self.is_noise() {
            return None;
        }
        match self.kind.as_str() {
            "app_mention" => Some(EventKind::Mention),
            "message" if self.is_direct_message() => Some(EventKind::DirectMessage),
            _ => None,
        }
    }

    /// Thread the reply belongs in; DMs are answered inline.
    pub fn reply_thread(&self, kind: EventKind) -> Option<&str> {
        match kind {
            EventKind::Mention => Some(self.thread_ts.as_deref().unwrap_or(&self.ts)),
            EventKind::DirectMessage => self.thread_ts.as_deref(),
        }
    }
}

static ANY_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<@[A-Z0-9]+>").expect("valid mention regex"));

/// Strip the bot mention (and the display-name form) from message text.
///
/// When the bot's user id is unknown, a leading mention of anyone is removed.
pub fn extract_query(text: &str, bot_user_id: Option<&str>) -> String {
    let stripped = match bot_user_id {
        Some(id) => text.replace(&format!("<@{id}>"), ""),
        None => ANY_MENTION.replace(text, "").into_owned(),
    };
    stripped.replace("@AI Agent", "").trim().to_string()
}

//! Chat event handling.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::event::{extract_query, ChatEvent, EventKind};
use super::slack::ChatClient;
use crate::memory::SessionId;
use crate::models::QueryResult;
use crate::orchestrator::QueryOrchestrator;

/// What happened to an inbound event.
#[derive(Debug)]
pub enum HandleOutcome {
    /// Not addressed to the bot.
    Ignored,
    /// Empty query; a greeting was sent.
    Greeted,
    /// The query ran and its result was posted.
    Answered(QueryResult),
}

/// Turns chat events into orchestrated queries and posts the replies.
pub struct ChatHandler {
    orchestrator: Arc<QueryOrchestrator>,
    chat: Arc<dyn ChatClient>,
    repository_path: PathBuf,
    timeout: Duration,
    per_user_sessions: bool,
}

impl ChatHandler {
    pub fn new(
        orchestrator: Arc<QueryOrchestrator>,
        chat: Arc<dyn ChatClient>,
        repository_path: PathBuf,
        timeout: Duration,
        per_user_sessions: bool,
    ) -> Self {
        Self {
            orchestrator,
            chat,
            repository_path,
            timeout,
            per_user_sessions,
        }
    }

    /// Session for an event: its thread, or the channel when unthreaded.
    pub fn session_for(&self, event: &ChatEvent, kind: EventKind) -> SessionId {
        let user = if self.per_user_sessions {
            event.user.as_deref()
        } else {
            None
        };
        SessionId::new(&event.channel, event.reply_thread(kind), user)
    }

    pub async fn handle(&self, event: ChatEvent) -> HandleOutcome {
        let Some(kind) = event.route() else {
            tracing::trace!(kind = %event.kind, channel = %event.channel, "Ignoring event");
            return HandleOutcome::Ignored;
        };

        let bot_user_id = match kind {
            EventKind::Mention => self.chat.bot_user_id().await.unwrap_or_else(|e| {
                tracing::warn!("Could not resolve bot user id: {e}");
                None
            }),
            EventKind::DirectMessage => None,
        };
        let query = extract_query(&event.text, bot_user_id.as_deref());

        if query.is_empty() {
            self.post(&event.channel, kind.greeting(), None).await;
            return HandleOutcome::Greeted;
        }

        let session = self.session_for(&event, kind);
        tracing::info!(?kind, channel = %event.channel, %session, "Handling chat query");

        let reaction = kind.working_reaction();
        if let Err(e) = self.chat.add_reaction(&event.channel, &event.ts, reaction).await {
            tracing::debug!("Failed to add reaction: {e}");
        }

        let result = self
            .orchestrator
            .run(&query, &self.repository_path, self.timeout, Some(&session))
            .await;

        if let Err(e) = self.chat.remove_reaction(&event.channel, &event.ts, reaction).await {
            tracing::debug!("Failed to remove reaction: {e}");
        }

        self.post(&event.channel, &result.reply_text(), event.reply_thread(kind))
            .await;
        HandleOutcome::Answered(result)
    }

    async fn post(&self, channel: &str, text: &str, thread_ts: Option<&str>) {
        if let Err(e) = self.chat.post_message(channel, text, thread_ts).await {
            tracing::error!(channel, "Failed to post reply: {e}");
        }
    }
}

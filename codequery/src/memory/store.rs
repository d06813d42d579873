//! In-memory session store.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use super::eviction::{EvictionPolicy, MaxTurns};
use super::session_id::SessionId;
use crate::models::{Role, Turn};

/// Process-wide conversation history, one bounded turn list per session.
///
/// Each call is atomic on its own, but a read followed by an append is not:
/// two concurrent requests on the same session can interleave their turns.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Vec<Turn>>>,
    policy: Box<dyn EvictionPolicy>,
}

impl SessionStore {
    /// Store keeping the most recent `max_turns` per session.
    pub fn new(max_turns: usize) -> Self {
        Self::with_policy(MaxTurns(max_turns))
    }

    /// Store with a custom eviction policy.
    pub fn with_policy(policy: impl EvictionPolicy + 'static) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy: Box::new(policy),
        }
    }

    /// Turns of a session in chronological order; empty if unknown.
    pub fn get_context(&self, id: &SessionId) -> Vec<Turn> {
        self.sessions.read().get(id).cloned().unwrap_or_default()
    }

    /// Append a turn, creating the session if needed, then apply eviction.
    pub fn add_message(&self, id: &SessionId, role: Role, content: impl Into<String>) {
        let mut sessions = self.sessions.write();
        let turns = sessions.entry(id.clone()).or_default();

        // Wall clock can step backwards; keep timestamps non-decreasing.
        let now = Utc::now();
        let timestamp = turns.last().map_or(now, |last| last.timestamp.max(now));
        turns.push(Turn::at(role, content, timestamp));

        self.policy.evict(turns);
        tracing::trace!(session = %id, turns = turns.len(), "Recorded {role} turn");
    }

    /// Render history as `User: ...` / `Assistant: ...` lines.
    ///
    /// Returns an empty string for an empty or unknown session.
    pub fn get_formatted_context(&self, id: &SessionId) -> String {
        let sessions = self.sessions.read();
        sessions
            .get(id)
            .map(|turns| {
                turns
                    .iter()
                    .map(Turn::render)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    /// Remove a session. No-op if absent.
    pub fn clear_session(&self, id: &SessionId) {
        if self.sessions.write().remove(id).is_some() {
            tracing::debug!(session = %id, "Cleared session");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    #[cfg(test)]
    pub fn turn_count(&self, id: &SessionId) -> usize {
        self.sessions.read().get(id).map_or(0, Vec::len)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_policy(MaxTurns::default())
    }
}

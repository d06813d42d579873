//! Session key derivation.

use serde::{Deserialize, Serialize};

const SEPARATOR: char = ':';

/// Stable key identifying a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Build a key from chat identity parts.
    ///
    /// Without a thread the channel stands in for it, so unthreaded messages in
    /// one channel share context. A user part, when given, leads the key and
    /// scopes the session to that user.
    pub fn new(channel: &str, thread: Option<&str>, user: Option<&str>) -> Self {
        let thread = thread.filter(|t| !t.is_empty()).unwrap_or(channel);
        let key = match user {
            Some(user) => format!("{user}{SEPARATOR}{channel}{SEPARATOR}{thread}"),
            None => format!("{channel}{SEPARATOR}{thread}"),
        };
        Self(key)
    }

    /// Wrap an already-derived key (e.g. from an HTTP path).
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

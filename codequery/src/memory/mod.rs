//! Session-scoped conversational memory.
//!
//! Sessions are keyed by a [`SessionId`] built from the chat identity of a
//! message and hold a bounded, chronological list of turns. Nothing here is
//! persisted; sessions live until cleared or the process exits.

mod eviction;
mod session_id;
mod store;

pub use session_id::SessionId;
pub use store::SessionStore;

/// Turns retained per session unless configured otherwise.
pub const DEFAULT_MAX_TURNS: usize = 10;

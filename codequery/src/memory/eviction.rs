//! Eviction policies applied after every append.

use crate::models::Turn;

/// Decides which turns a session keeps after a new one is appended.
///
/// Implementations may only drop turns; they must never reorder them.
pub trait EvictionPolicy: Send + Sync {
    fn evict(&self, turns: &mut Vec<Turn>);
}

/// Keep the most recent `max` turns, dropping the oldest first.
#[derive(Debug, Clone, Copy)]
pub struct MaxTurns(pub usize);

impl Default for MaxTurns {
    fn default() -> Self {
        Self(super::DEFAULT_MAX_TURNS)
    }
}

impl EvictionPolicy for MaxTurns {
    fn evict(&self, turns: &mut Vec<Turn>) {
        if turns.len() > self.0 {
            let excess = turns.len() - self.0;
            turns.drain(..excess);
        }
    }
}

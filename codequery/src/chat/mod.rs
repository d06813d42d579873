//! Chat platform integration.
//!
//! Inbound Slack events are routed to the query orchestrator and the answer
//! is posted back. Reactions are cosmetic: their failures are swallowed.

mod event;
mod handler;
mod slack;

#[cfg(test)]
pub use event::ChatEvent;
pub use event::SlackEnvelope;
pub use handler::{ChatHandler, HandleOutcome};
pub use slack::SlackClient;

//! Failures of an analysis invocation.

use thiserror::Error;

/// Why an analysis produced no raw text.
///
/// Every variant carries the wall time spent before giving up.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The tool overran its deadline and was killed.
    #[error("Query timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, elapsed_ms: u64 },

    /// The tool exited with a non-zero status.
    #[error("{message}")]
    Process {
        code: Option<i32>,
        message: String,
        elapsed_ms: u64,
    },

    /// Spawning or talking to the tool failed.
    #[error("Failed to execute {tool}: {message}")]
    Unexpected {
        tool: String,
        message: String,
        elapsed_ms: u64,
    },
}

impl AnalysisError {
    pub const fn elapsed_ms(&self) -> u64 {
        match self {
            Self::Timeout { elapsed_ms, .. }
            | Self::Process { elapsed_ms, .. }
            | Self::Unexpected { elapsed_ms, .. } => *elapsed_ms,
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

//! Response-formatting mode chosen for a query.

use serde::{Deserialize, Serialize};

/// Audience a response is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Non-technical stakeholder framing.
    #[default]
    Default,
    /// Developer fix-guide framing for on-call work.
    Oncall,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Oncall => "oncall",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

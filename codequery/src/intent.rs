//! Query intent classification.
//!
//! Picks the response-formatting [`Mode`] for a question. Anything that reads
//! like an operational problem gets the on-call fix guide, everything else the
//! stakeholder summary.

use crate::models::Mode;

/// Substrings that mark a query as on-call work.
/// NOTE: All keywords must be lowercase since we compare against lowercased input.
const ONCALL_KEYWORDS: &[&str] = &[
    "oncall", "on-call", "on call", "issue", "fix", "error", "incident", "bug", "broken",
];

/// Classify a query into a formatting mode.
pub fn classify(query: &str) -> Mode {
    let normalized = query.trim().to_lowercase();
    if normalized.is_empty() {
        return Mode::Default;
    }

    if ONCALL_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        Mode::Oncall
    } else {
        Mode::Default
    }
}

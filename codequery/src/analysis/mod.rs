//! Analysis tool invocation.
//!
//! Runs the external code-analysis CLI against a repository with write
//! protection and a hard deadline, and turns whatever it prints into raw
//! answer text.

mod error;
mod guard;
mod invoker;
mod output;

#[cfg(test)]
pub use guard::WriteProtector;
pub use invoker::{AnalysisConfig, AnalysisInvoker, DEFAULT_ANALYSIS_MODEL, DEFAULT_TOOL};

//! Runtime settings.
//!
//! Every knob is a command line flag with an environment variable fallback.
//! `.env` is loaded before parsing, so deployments can keep them in a file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};

use crate::analysis::{AnalysisConfig, AnalysisInvoker, DEFAULT_ANALYSIS_MODEL, DEFAULT_TOOL};
use crate::formatter::{
    OpenAiCompatClient, ResponseFormatter, DEFAULT_BASE_URL, DEFAULT_COMPLETION_MODEL,
};
use crate::memory::{SessionStore, DEFAULT_MAX_TURNS};
use crate::orchestrator::QueryOrchestrator;

/// Default analysis timeout: ten minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Repository the analysis tool runs against [default: current directory]
    #[arg(long = "repo", env = "CODEQUERY_REPOSITORY_PATH", global = true)]
    pub repository_path: Option<PathBuf>,

    /// Analysis timeout in milliseconds
    #[arg(long, env = "CODEQUERY_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS, global = true)]
    pub timeout_ms: u64,

    /// Make the repository read-only while the analysis tool runs
    #[arg(
        long,
        env = "ENABLE_READONLY_ENFORCEMENT",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub readonly_enforcement: bool,

    /// Analysis CLI program
    #[arg(long, env = "CODEQUERY_ANALYSIS_TOOL", default_value = DEFAULT_TOOL, global = true)]
    pub analysis_tool: String,

    /// Model passed to the analysis CLI
    #[arg(long, env = "CODEQUERY_ANALYSIS_MODEL", default_value = DEFAULT_ANALYSIS_MODEL, global = true)]
    pub analysis_model: String,

    /// Model used to format answers
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_COMPLETION_MODEL, global = true)]
    pub completion_model: String,

    /// Base URL of the OpenAI-compatible completion API
    #[arg(long, env = "CODEQUERY_COMPLETION_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub completion_base_url: String,

    /// API key for the completion API
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub completion_api_key: Option<String>,

    /// Completion request timeout in seconds
    #[arg(long, env = "CODEQUERY_COMPLETION_TIMEOUT_SECS", default_value_t = 120, global = true)]
    pub completion_timeout_secs: u64,

    /// Turns of history kept per session
    #[arg(long, env = "CODEQUERY_MAX_TURNS", default_value_t = DEFAULT_MAX_TURNS, global = true)]
    pub max_turns: usize,

    /// Scope chat sessions to the asking user as well as the thread
    #[arg(long, env = "CODEQUERY_PER_USER_SESSIONS", global = true)]
    pub per_user_sessions: bool,
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub repository_path: PathBuf,
    pub timeout: Duration,
    pub analysis: AnalysisConfig,
    pub completion_model: String,
    pub completion_base_url: String,
    pub completion_api_key: Option<String>,
    pub completion_timeout: Duration,
    pub max_turns: usize,
    pub per_user_sessions: bool,
}

impl TryFrom<SettingsArgs> for Settings {
    type Error = anyhow::Error;

    fn try_from(args: SettingsArgs) -> Result<Self> {
        let repository_path = match args.repository_path {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let repository_path = validate_repository(&repository_path)?;

        if args.timeout_ms == 0 {
            bail!("Timeout must be greater than zero");
        }
        if args.max_turns == 0 {
            bail!("Max turns must be greater than zero");
        }
        if args.completion_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set, answers will be returned unformatted");
        }

        Ok(Self {
            repository_path,
            timeout: Duration::from_millis(args.timeout_ms),
            analysis: AnalysisConfig {
                tool: args.analysis_tool,
                model: args.analysis_model,
                enforce_read_only: args.readonly_enforcement,
            },
            completion_model: args.completion_model,
            completion_base_url: args.completion_base_url,
            completion_api_key: args.completion_api_key,
            completion_timeout: Duration::from_secs(args.completion_timeout_secs),
            max_turns: args.max_turns,
            per_user_sessions: args.per_user_sessions,
        })
    }
}

impl Settings {
    /// Wire up the query pipeline.
    pub fn build_orchestrator(&self) -> Result<QueryOrchestrator> {
        let client = OpenAiCompatClient::new(
            self.completion_base_url.clone(),
            self.completion_api_key.clone(),
            self.completion_timeout,
        )
        .context("Failed to build completion client")?;

        Ok(QueryOrchestrator::new(
            Arc::new(AnalysisInvoker::new(self.analysis.clone())),
            Arc::new(ResponseFormatter::new(
                Arc::new(client),
                self.completion_model.clone(),
            )),
            Arc::new(SessionStore::new(self.max_turns)),
        ))
    }
}

/// Canonicalize and check that the path is an existing directory.
fn validate_repository(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Repository path not found: {}", path.display()))?;
    if !canonical.is_dir() {
        bail!("Repository path is not a directory: {}", canonical.display());
    }
    Ok(canonical)
}

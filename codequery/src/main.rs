//! codequery - Answer questions about a codebase from chat.
//!
//! Architecture:
//! - An external code-analysis CLI reads the repository (made read-only while it runs)
//! - A completion model rewrites the raw answer for its audience (stakeholder or on-call)
//! - Per-thread conversation memory lets follow-up questions build on earlier answers
//! - Slack events and a JSON API are served over HTTP; the CLI asks directly

mod analysis;
mod chat;
mod cli;
mod config;
mod formatter;
mod intent;
mod memory;
mod models;
mod orchestrator;
mod process;
mod server;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before parsing so its values reach clap's env fallbacks
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dotenv {
        if !matches!(e, dotenvy::Error::Io(_)) {
            tracing::warn!("Failed to load .env file: {e}");
        }
    }

    execute(cli).await
}

/// Log to stderr so answers on stdout stay clean. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "codequery=debug,tower_http=debug" } else { "codequery=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

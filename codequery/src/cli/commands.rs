//! CLI command execution.

use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use crate::chat::{ChatHandler, SlackClient};
use crate::config::{Settings, SettingsArgs};
use crate::intent::classify;
use crate::memory::SessionId;
use crate::models::QueryResult;
use crate::orchestrator::QueryOrchestrator;
use crate::server::{self, ServerState};

use super::args::{Cli, Commands};

/// Typed at the `chat` prompt to forget the conversation so far.
const CLEAR_COMMAND: &str = "/clear";

// === Command Execution ===

pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Classify { message } => {
            println!("{}", classify(&message.join(" ")));
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            slack_bot_token,
        } => {
            let (settings, orchestrator) = setup(cli.settings)?;
            serve(&settings, orchestrator, SocketAddr::new(host, port), slack_bot_token).await
        }
        Commands::Ask { message } => {
            let (settings, orchestrator) = setup(cli.settings)?;
            ask(&settings, &orchestrator, &message.join(" ")).await
        }
        Commands::Chat => {
            let (settings, orchestrator) = setup(cli.settings)?;
            chat(&settings, &orchestrator).await
        }
    }
}

fn setup(args: SettingsArgs) -> Result<(Settings, Arc<QueryOrchestrator>)> {
    let settings = Settings::try_from(args)?;
    let orchestrator = Arc::new(settings.build_orchestrator()?);
    Ok((settings, orchestrator))
}

async fn serve(
    settings: &Settings,
    orchestrator: Arc<QueryOrchestrator>,
    addr: SocketAddr,
    slack_bot_token: Option<String>,
) -> Result<()> {
    let chat = slack_bot_token.filter(|t| !t.is_empty()).map(|token| {
        Arc::new(ChatHandler::new(
            orchestrator.clone(),
            Arc::new(SlackClient::new(token)),
            settings.repository_path.clone(),
            settings.timeout,
            settings.per_user_sessions,
        ))
    });
    if chat.is_none() {
        tracing::warn!("SLACK_BOT_TOKEN is not set, only the JSON API is served");
    }

    let state = ServerState {
        orchestrator,
        chat,
        repository_path: settings.repository_path.clone(),
        timeout: settings.timeout,
    };
    server::start_server(state, addr).await
}

async fn ask(settings: &Settings, orchestrator: &QueryOrchestrator, message: &str) -> Result<()> {
    let message = message.trim();
    if message.is_empty() {
        bail!("Message is required for ask command");
    }

    let result = orchestrator
        .run(message, &settings.repository_path, settings.timeout, None)
        .await;
    print_result(&result);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Read questions from stdin until EOF, all in one session.
async fn chat(settings: &Settings, orchestrator: &QueryOrchestrator) -> Result<()> {
    let session = SessionId::new("cli", Some(&Uuid::now_v7().to_string()), None);
    println!("Asking about {}", settings.repository_path.display());
    println!("Type {CLEAR_COMMAND} to start over, Ctrl-D to quit.");

    loop {
        let Some(line) = prompt_line("> ").await? else {
            println!();
            return Ok(());
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line == CLEAR_COMMAND {
            orchestrator.memory().clear_session(&session);
            println!("Conversation cleared.");
            continue;
        }

        let result = orchestrator
            .run(line, &settings.repository_path, settings.timeout, Some(&session))
            .await;
        print_result(&result);
    }
}

/// Print `prompt` and read one line; `None` at end of input.
async fn prompt_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush().context("Failed to flush stdout")?;

    tokio::task::spawn_blocking(|| -> Result<Option<String>> {
        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read stdin")?;
        Ok((read > 0).then_some(line))
    })
    .await
    .context("stdin reader panicked")?
}

fn print_result(result: &QueryResult) {
    if result.success {
        println!("\n{}\n", result.reply_text());
    } else {
        eprintln!("\n{}\n", result.reply_text());
    }
    println!("({:.1}s)", execution_seconds(result));
}

#[allow(clippy::cast_precision_loss)]
fn execution_seconds(result: &QueryResult) -> f64 {
    result.execution_time_ms as f64 / 1000.0
}

//! CLI argument definitions.

use std::net::IpAddr;

use clap::{Parser, Subcommand};

use crate::config::SettingsArgs;

/// codequery - Answer questions about a codebase, in chat or on the command line
#[derive(Parser, Debug)]
#[command(name = "codequery")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (Slack events and JSON API)
    Serve {
        /// Address to bind
        #[arg(long, env = "CODEQUERY_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(short, long, env = "CODEQUERY_PORT", default_value = "3000")]
        port: u16,

        /// Slack bot token; without it /slack/events is disabled
        #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
        slack_bot_token: Option<String>,
    },

    /// Ask a single question and print the answer
    Ask {
        /// Question to ask
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },

    /// Interactive session; follow-up questions see earlier answers
    Chat,

    /// Print the formatting mode a question would get
    Classify {
        /// Question to classify
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_joins_trailing_words() {
        let cli = Cli::try_parse_from(["codequery", "ask", "why", "is", "login", "--slow"]).unwrap();
        match cli.command {
            Commands::Ask { message } => assert_eq!(message.join(" "), "why is login --slow"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn settings_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["codequery", "classify", "--max-turns", "4", "hi"]).unwrap();
        assert_eq!(cli.settings.max_turns, 4);
    }

    #[test]
    fn ask_requires_a_message() {
        assert!(Cli::try_parse_from(["codequery", "ask"]).is_err());
    }
}

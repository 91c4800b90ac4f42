//! Terminal front end for a local Ollama-compatible inference service.

mod commands;
mod env;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ollama_chat_core::{ChatClient, ChatConfig, JsonFileChatStore};

use crate::commands::{AskArgs, HistoryCommand};

#[derive(Debug, Parser)]
#[command(name = "ollama-chat", version, about = "Chat with a local Ollama model")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Overrides applied on top of `OLLAMA_CHAT_*` environment settings.
#[derive(Debug, clap::Args)]
struct GlobalArgs {
    /// Base URL of the inference service
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Model to use instead of the first installed one
    #[arg(long, short = 'm', global = true)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// Wait for the full response instead of streaming it
    #[arg(long, global = true)]
    no_stream: bool,

    /// Chat history file
    #[arg(long, global = true, value_name = "PATH")]
    history: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check connectivity and show the default model
    Probe,
    /// List installed models
    Models,
    /// Send one prompt and print the response
    Ask(AskArgs),
    /// Interactive chat (default)
    Chat,
    /// Inspect and manage saved chats
    #[command(subcommand)]
    History(HistoryCommand),
}

impl GlobalArgs {
    fn config(&self) -> Result<ChatConfig> {
        let mut config = ChatConfig::from_env().context("invalid OLLAMA_CHAT_* settings")?;
        if let Some(url) = &self.base_url {
            config = config.base_url(url.clone());
        }
        if let Some(model) = &self.model {
            config = config.model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            config = config.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            config = config.max_tokens(max_tokens);
        }
        if self.no_stream {
            config = config.stream(false);
        }
        config.validate().context("invalid settings")?;
        Ok(config)
    }

    fn store(&self) -> JsonFileChatStore {
        JsonFileChatStore::new(
            self.history
                .clone()
                .unwrap_or_else(env::default_history_path),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init();
    ollama_chat_core::init_observability();

    let cli = Cli::parse();
    let config = cli.global.config()?;
    let store = cli.global.store();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Probe => commands::probe(&ChatClient::new(config)?).await,
        Command::Models => commands::models(&ChatClient::new(config)?).await,
        Command::Ask(args) => commands::ask(&ChatClient::new(config)?, args).await,
        Command::Chat => commands::chat(ChatClient::new(config)?, store).await,
        Command::History(command) => commands::history(&store, &config, command),
    }
}

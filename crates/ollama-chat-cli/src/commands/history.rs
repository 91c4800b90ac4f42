use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use ollama_chat_core::conversation::format_local;
use ollama_chat_core::{ChatConfig, ChatStore, Conversation};

use crate::output;

#[derive(Debug, clap::Subcommand)]
pub enum HistoryCommand {
    /// List saved chats, newest first
    List,
    /// Print one chat
    Show { id: String },
    /// Write one chat as a plain-text report
    Export {
        id: String,
        /// Output file (stdout when omitted)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Delete one chat
    Delete { id: String },
    /// Delete every saved chat
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

pub fn history(store: &dyn ChatStore, config: &ChatConfig, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let chats = store.list()?;
            if chats.is_empty() {
                println!("No saved chats.");
            }
            for chat in chats {
                println!(
                    "{}  {}  {:>3} msgs  {}",
                    chat.id,
                    format_local(chat.created),
                    chat.messages.len(),
                    chat.title
                );
            }
        }
        HistoryCommand::Show { id } => {
            let chat = load(store, &id)?;
            println!("{} [{}]\n", chat.title, chat.model);
            for message in &chat.messages {
                output::print_message(message);
            }
        }
        HistoryCommand::Export { id, output } => {
            let chat = load(store, &id)?;
            if chat.messages.is_empty() {
                bail!("no messages to export");
            }
            let report = Conversation::from_chat(chat).export_text(config);
            match output {
                Some(path) => {
                    std::fs::write(&path, report)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => print!("{report}"),
            }
        }
        HistoryCommand::Delete { id } => {
            if !store.delete(&id)? {
                bail!("no chat with id {id}");
            }
            println!("Deleted {id}");
        }
        HistoryCommand::Clear { yes } => {
            if !yes {
                bail!("refusing to delete all chats without --yes");
            }
            store.clear()?;
            println!("All chats deleted.");
        }
    }
    Ok(())
}

fn load(store: &dyn ChatStore, id: &str) -> Result<ollama_chat_core::Chat> {
    store
        .load(id)?
        .with_context(|| format!("no chat with id {id}"))
}

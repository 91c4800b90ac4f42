use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ollama_chat_core::conversation::format_local;
use ollama_chat_core::{
    ChatClient, ChatStore, Connectivity, Conversation, GenerationRequest, GenerationSession,
    SessionState, format_model_name,
};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::warn;

use crate::output;

const HELP: &str = "\
Commands:
  /new              start a new chat
  /regen            regenerate the last response
  /export [PATH]    write this chat as a text report
  /copy             print this chat as a You:/AI: transcript
  /clear            remove all messages from this chat
  /history          list saved chats
  /open ID          continue a saved chat
  /model NAME       switch model
  /help             show this help
  /quit             leave
Ctrl-C stops a running generation.";

enum Flow {
    Continue,
    Quit,
}

struct Repl<S> {
    client: ChatClient,
    store: S,
    default_model: String,
    conversation: Conversation,
}

/// Interactive chat loop.
pub async fn chat<S: ChatStore>(client: ChatClient, store: S) -> Result<()> {
    let default_model = match client.probe().await {
        Connectivity::Connected {
            models,
            default_model,
        } => {
            let model = default_model.unwrap_or_default();
            println!(
                "Connected to {} ({} models). Model: {}",
                client.config().base_url,
                models.len(),
                display_model(&model)
            );
            model
        }
        Connectivity::Disconnected { reason } => {
            println!("Disconnected from {}: {reason}", client.config().base_url);
            client.config().model.clone().unwrap_or_default()
        }
    };
    println!("Type /help for commands.\n");

    let mut repl = Repl::new(client, store, default_model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let flow = match line.strip_prefix('/') {
            Some(command) => repl.command(command).await,
            None => {
                repl.send(line).await;
                Flow::Continue
            }
        };
        if let Flow::Quit = flow {
            break;
        }
    }
    Ok(())
}

fn display_model(model: &str) -> String {
    if model.is_empty() {
        "none (use /model NAME)".to_string()
    } else {
        format!("{} ({model})", format_model_name(model))
    }
}

impl<S: ChatStore> Repl<S> {
    fn new(client: ChatClient, store: S, default_model: String) -> Self {
        Self {
            conversation: Conversation::new(default_model.clone()),
            client,
            store,
            default_model,
        }
    }

    async fn command(&mut self, input: &str) -> Flow {
        let (name, arg) = match input.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (input, ""),
        };
        match name {
            "new" => {
                self.conversation = Conversation::new(self.default_model.clone());
                println!("Started a new chat.");
            }
            "regen" => self.regenerate().await,
            "export" => self.export(arg),
            "copy" => {
                if self.conversation.is_empty() {
                    println!("No chat to copy.");
                } else {
                    print!("{}", self.conversation.copy_text());
                }
            }
            "clear" => {
                if !self.conversation.is_empty() {
                    self.conversation.clear_messages();
                    self.save();
                }
                println!("Chat cleared.");
            }
            "history" => self.list_history(),
            "open" => self.open(arg),
            "model" if arg.is_empty() => {
                println!("Model: {}", display_model(&self.conversation.chat().model));
            }
            "model" => {
                self.default_model = arg.to_string();
                self.conversation.set_model(arg);
                println!("Model: {}", display_model(arg));
            }
            "help" => println!("{HELP}"),
            "quit" | "exit" => return Flow::Quit,
            other => println!("Unknown command /{other}. Type /help."),
        }
        Flow::Continue
    }

    async fn send(&mut self, prompt: &str) {
        let model = self.conversation.chat().model.clone();
        if model.is_empty() {
            println!("No model selected; use /model NAME.");
            return;
        }
        self.conversation.add_user(prompt);
        self.save();
        let request = self.client.request(model, prompt);
        self.run_turn(request).await;
    }

    async fn regenerate(&mut self) {
        let Some(id) = self.conversation.last_assistant_id().map(str::to_owned) else {
            println!("Nothing to regenerate.");
            return;
        };
        match self.conversation.regenerate(&id, self.client.config()) {
            Ok(request) => self.run_turn(request).await,
            Err(err) => println!("{err}"),
        }
    }

    async fn run_turn(&mut self, request: GenerationRequest) {
        let session = match self.generate(request).await {
            Ok(session) => session,
            Err(err) => {
                eprintln!("Error: {err}");
                return;
            }
        };
        if session.state() == SessionState::Failed {
            eprintln!("{}", session.transcript_text());
        }
        self.conversation.record_turn(&session);
        self.save();
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationSession, ollama_chat_core::ChatError> {
        if self.client.config().stream {
            Ok(output::stream_to_terminal(self.client.stream(request)?).await)
        } else {
            let session = self.client.generate_once(request).await?;
            output::print_session(&session);
            Ok(session)
        }
    }

    fn export(&self, path: &str) {
        if self.conversation.is_empty() {
            println!("No messages to export.");
            return;
        }
        let path = if path.is_empty() {
            PathBuf::from(format!(
                "local_ai_chat_{}_{}.txt",
                self.conversation.id(),
                chrono::Utc::now().timestamp_millis()
            ))
        } else {
            PathBuf::from(path)
        };
        let report = self.conversation.export_text(self.client.config());
        match std::fs::write(&path, report) {
            Ok(()) => println!("Exported to {}", path.display()),
            Err(err) => eprintln!("Error: failed to write {}: {err}", path.display()),
        }
    }

    fn list_history(&self) {
        match self.store.list() {
            Ok(chats) if chats.is_empty() => println!("No saved chats."),
            Ok(chats) => {
                for chat in chats {
                    let marker = if chat.id == self.conversation.id() { "*" } else { " " };
                    println!(
                        "{marker} {}  {}  {}",
                        chat.id,
                        format_local(chat.created),
                        chat.title
                    );
                }
            }
            Err(err) => eprintln!("Error: {err}"),
        }
    }

    fn open(&mut self, id: &str) {
        if id.is_empty() {
            println!("Usage: /open ID");
            return;
        }
        match self.store.load(id) {
            Ok(Some(chat)) => {
                println!("{} [{}]\n", chat.title, chat.model);
                for message in &chat.messages {
                    output::print_message(message);
                }
                let mut conversation = Conversation::from_chat(chat);
                if conversation.chat().model.is_empty() {
                    conversation.set_model(self.default_model.clone());
                }
                self.conversation = conversation;
            }
            Ok(None) => println!("No chat with id {id}."),
            Err(err) => eprintln!("Error: {err}"),
        }
    }

    fn save(&self) {
        if let Err(err) = self.store.save(self.conversation.chat()) {
            warn!(chat_id = %self.conversation.id(), error = %err, "failed to save chat");
            eprintln!("Warning: chat not saved: {err}");
        }
    }
}

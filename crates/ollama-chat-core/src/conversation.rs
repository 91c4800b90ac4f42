use chrono::{Local, TimeZone as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::errors::ChatError;
use crate::model::GenerationRequest;
use crate::session::GenerationSession;

const TITLE_LIMIT: usize = 50;
const DEFAULT_TITLE: &str = "New Chat";
const RULE: &str = "========================================";
const THIN_RULE: &str = "----------------------------------------";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn export_label(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "AI",
        }
    }

    fn copy_label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "AI",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

/// A persisted conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    /// Epoch milliseconds.
    pub created: i64,
    pub model: String,
}

impl Chat {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chat_{}", uuid::Uuid::new_v4().simple()),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created: now_millis(),
            model: model.into(),
        }
    }
}

/// First 50 characters of `content`, with `...` when truncated.
pub fn title_from(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_LIMIT).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Mutating helpers over one [`Chat`].
#[derive(Clone, Debug)]
pub struct Conversation {
    chat: Chat,
}

impl Conversation {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            chat: Chat::new(model),
        }
    }

    pub fn from_chat(chat: Chat) -> Self {
        Self { chat }
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn into_chat(self) -> Chat {
        self.chat
    }

    pub fn id(&self) -> &str {
        &self.chat.id
    }

    pub fn is_empty(&self) -> bool {
        self.chat.messages.is_empty()
    }

    /// Switches the model used for subsequent turns.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.chat.model = model.into();
    }

    /// Appends a user prompt. The first message names the chat.
    pub fn add_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(ChatMessage::new(Role::User, content))
    }

    /// Appends the assistant message for a finished turn.
    ///
    /// Failed and cancelled turns are recorded with their displayed text.
    pub fn record_turn(&mut self, session: &GenerationSession) -> &ChatMessage {
        self.chat.model = session.request().model.clone();
        self.push(ChatMessage::new(Role::Assistant, session.transcript_text()))
    }

    /// Id of the most recent assistant message.
    pub fn last_assistant_id(&self) -> Option<&str> {
        self.chat
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.id.as_str())
    }

    /// Removes assistant message `message_id` and returns a fresh request for
    /// the user prompt immediately preceding it.
    pub fn regenerate(
        &mut self,
        message_id: &str,
        config: &ChatConfig,
    ) -> Result<GenerationRequest, ChatError> {
        let index = self
            .chat
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| ChatError::Validation(format!("no message with id {message_id}")))?;
        if self.chat.messages[index].role != Role::Assistant {
            return Err(ChatError::Validation(
                "only assistant messages can be regenerated".into(),
            ));
        }
        let prompt = index
            .checked_sub(1)
            .map(|i| &self.chat.messages[i])
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .ok_or_else(|| {
                ChatError::Validation("no user prompt precedes this message".into())
            })?;
        self.chat.messages.remove(index);
        debug!(chat_id = %self.chat.id, message_id, "regenerating response");
        Ok(GenerationRequest::from_config(
            config,
            self.chat.model.clone(),
            prompt,
        ))
    }

    /// Drops every message and resets the title.
    pub fn clear_messages(&mut self) {
        self.chat.messages.clear();
        self.chat.title = DEFAULT_TITLE.to_string();
    }

    /// Plain-text report used by `/export` and `history export`.
    pub fn export_text(&self, config: &ChatConfig) -> String {
        let chat = &self.chat;
        let mut out = String::new();
        out.push_str(&format!("{RULE}\nLOCAL AI CHAT EXPORT\n{RULE}\n\n"));
        out.push_str(&format!("Model: {}\n", chat.model));
        out.push_str(&format!("Date: {}\n", format_local(now_millis())));
        out.push_str(&format!("Chat ID: {}\n", chat.id));
        out.push_str(&format!("Chat Title: {}\n", chat.title));
        out.push_str(&format!("Messages: {}\n", chat.messages.len()));
        out.push_str(&format!("Temperature: {}\n", config.temperature));
        out.push_str(&format!("Max Tokens: {}\n", config.max_tokens));
        out.push_str(&format!("{RULE}\n\n"));
        for (index, msg) in chat.messages.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", index + 1, msg.role.export_label()));
            out.push_str(&format!("Time: {}\n", format_local(msg.timestamp)));
            out.push_str(&format!("Message ID: {}\n", msg.id));
            out.push_str(&format!("{THIN_RULE}\n{}\n\n", msg.content));
        }
        out
    }

    /// `You:` / `AI:` transcript.
    pub fn copy_text(&self) -> String {
        self.chat
            .messages
            .iter()
            .map(|m| format!("{}:\n{}\n\n", m.role.copy_label(), m.content))
            .collect()
    }

    fn push(&mut self, message: ChatMessage) -> &ChatMessage {
        if self.chat.messages.is_empty() {
            self.chat.title = title_from(&message.content);
        }
        self.chat.messages.push(message);
        &self.chat.messages[self.chat.messages.len() - 1]
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Local date and time in the `1/11/2026, 5:16:53 PM` style.
pub fn format_local(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
        None => millis.to_string(),
    }
}

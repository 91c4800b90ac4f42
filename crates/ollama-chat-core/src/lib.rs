//! Streaming client core for a local Ollama-compatible inference service.
//!
//! A prompt becomes a [`GenerationRequest`]; [`ChatClient::stream`] starts a
//! [`GenerationRun`] that decodes the newline-delimited JSON response and
//! yields [`SessionUpdate`]s until the generation completes, fails or is
//! cancelled.
//!
//! # Streaming usage
//!
//! ```no_run
//! use ollama_chat_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = ChatClient::new(ChatConfig::from_env()?)?;
//! let mut run = client.stream(client.request("llama3.2", "Say hello"))?;
//!
//! while let Some(update) = run.next_update().await {
//!     if let SessionUpdate::Render { delta, .. } = update {
//!         print!("{delta}");
//!     }
//! }
//! println!();
//! # Ok(())
//! # }
//! ```

/// HTTP client entry point and connectivity probe.
pub mod client;
/// Runtime configuration.
pub mod config;
/// Chats, messages and conversation helpers.
pub mod conversation;
/// Newline-delimited JSON stream decoding.
pub mod decoder;
/// Public error type.
pub mod errors;
/// Request and model types.
pub mod model;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Markdown subset rendering.
pub mod render;
/// Async driver and cancellation handle for a streaming generation.
pub mod run;
/// Generation state machine.
pub mod session;
/// Chat history persistence.
pub mod store;
/// Transport seam and the reqwest implementation.
pub mod transport;

pub use client::{ChatClient, Connectivity};
pub use config::ChatConfig;
pub use conversation::{Chat, ChatMessage, Conversation, Role};
pub use decoder::{NdjsonDecoder, StreamEvent, decode_events};
pub use errors::ChatError;
pub use model::{GenerationRequest, ModelTag, format_model_name};
pub use observability::init_observability;
pub use render::{RenderedBlock, plain_text, render, to_html};
pub use run::{AbortHandle, GenerationRun};
pub use session::{GenerationSession, SessionState, SessionUpdate};
pub use store::{ChatStore, JsonFileChatStore, MemoryChatStore};
pub use transport::{ByteStream, OllamaTransport, Transport};

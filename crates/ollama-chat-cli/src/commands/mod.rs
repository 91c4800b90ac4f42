mod ask;
mod history;
mod info;
mod repl;

pub use ask::{AskArgs, ask};
pub use history::{HistoryCommand, history};
pub use info::{models, probe};
pub use repl::chat;

use anyhow::{Result, bail};
use ollama_chat_core::{ChatClient, Connectivity};

/// Configured model, else the first installed one.
async fn resolve_model(client: &ChatClient) -> Result<String> {
    if let Some(model) = &client.config().model {
        return Ok(model.clone());
    }
    match client.probe().await {
        Connectivity::Connected {
            default_model: Some(model),
            ..
        } => Ok(model),
        Connectivity::Connected { .. } => bail!("no models installed; run `ollama pull <model>`"),
        Connectivity::Disconnected { reason } => {
            bail!("cannot reach {}: {reason}", client.config().base_url)
        }
    }
}

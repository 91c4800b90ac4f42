use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ChatConfig;
use crate::decoder::extract_error;
use crate::errors::ChatError;
use crate::model::{GenerationRequest, ModelTag};
use crate::run::GenerationRun;
use crate::session::GenerationSession;
use crate::transport::{OllamaTransport, Transport};

/// Result of probing `/api/tags`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// The service answered. `default_model` is the configured model, or the
    /// first installed one when none is configured.
    Connected {
        models: Vec<ModelTag>,
        default_model: Option<String>,
    },
    /// The service could not be reached; the UI shows a disconnected state
    /// and keeps accepting input.
    Disconnected { reason: String },
}

impl Connectivity {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Entry point for generations against one inference service.
///
/// Cheap to clone. Only one generation is expected to be in flight at a
/// time; starting another while one is streaming is not guarded against.
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    config: Arc<ChatConfig>,
}

impl ChatClient {
    /// Creates a client talking HTTP to `config.base_url`.
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        let transport = OllamaTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(config: ChatConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Builds a request for `prompt` with the configured sampling settings.
    pub fn request(&self, model: impl Into<String>, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest::from_config(&self.config, model, prompt)
    }

    /// Lists installed models.
    pub async fn list_models(&self) -> Result<Vec<ModelTag>, ChatError> {
        self.transport.list_models().await
    }

    /// Checks connectivity and picks a default model. Never fails.
    pub async fn probe(&self) -> Connectivity {
        match self.transport.list_models().await {
            Ok(models) => {
                let default_model = self
                    .config
                    .model
                    .clone()
                    .or_else(|| models.first().map(|m| m.name.clone()));
                info!(
                    models = models.len(),
                    default_model = default_model.as_deref().unwrap_or("<none>"),
                    "connected to inference service"
                );
                Connectivity::Connected {
                    models,
                    default_model,
                }
            }
            Err(err) => {
                warn!(base_url = %self.config.base_url, error = %err, "inference service unreachable");
                Connectivity::Disconnected {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Starts a streaming generation.
    ///
    /// Fails only for invalid requests; backend and transport failures are
    /// delivered through the run as a `Failed` update.
    pub fn stream(&self, request: GenerationRequest) -> Result<GenerationRun, ChatError> {
        GenerationRun::start(
            self.transport.clone(),
            request.with_stream(true),
            self.config.stream_buffer_capacity,
        )
    }

    /// Runs a non-streaming generation to a terminal session.
    ///
    /// Fails only for invalid requests; every other outcome is a `Completed`
    /// or `Failed` session.
    pub async fn generate_once(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationSession, ChatError> {
        let request = request.with_stream(false);
        request.validate()?;
        let mut session = GenerationSession::new(request);
        match self.transport.invoke_once(session.request()).await {
            Ok(body) => match body.get("response").and_then(|v| v.as_str()) {
                Some(text) if !text.is_empty() => {
                    session.complete_once(text)?;
                }
                _ => {
                    let err = match extract_error(&body) {
                        Some(message) => ChatError::Generation(message),
                        None => ChatError::Generation("No response received from backend".into()),
                    };
                    session.fail(&err);
                }
            },
            Err(err) => {
                session.fail(&err);
            }
        }
        Ok(session)
    }
}

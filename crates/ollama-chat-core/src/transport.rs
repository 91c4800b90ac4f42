use std::pin::Pin;

use futures::StreamExt as _;
use tracing::{debug, error};

use crate::config::ChatConfig;
use crate::errors::ChatError;
use crate::model::{GenerationRequest, ModelTag, TagsResponse};

/// Raw response body of a streaming generation.
///
/// Dropping the stream aborts the underlying connection.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, ChatError>> + Send + 'static>>;

/// HTTP seam between the client and the inference service.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Posts a streaming generation and returns the body once headers arrive.
    async fn open_stream(&self, request: &GenerationRequest) -> Result<ByteStream, ChatError>;

    /// Posts a non-streaming generation and returns the JSON body.
    async fn invoke_once(&self, request: &GenerationRequest)
    -> Result<serde_json::Value, ChatError>;

    /// Lists installed models.
    async fn list_models(&self) -> Result<Vec<ModelTag>, ChatError>;
}

/// [`Transport`] for an Ollama-compatible server, backed by `reqwest`.
#[derive(Clone)]
pub struct OllamaTransport {
    client: reqwest::Client,
    generate_url: String,
    tags_url: String,
}

impl OllamaTransport {
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            generate_url: config.api_url("/api/generate"),
            tags_url: config.api_url("/api/tags"),
        })
    }

    async fn post_generate(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let body = request.to_body_with_stream(stream);
        debug!(url = %self.generate_url, model = %request.model, stream, "posting generate request");
        let response = self
            .client
            .post(&self.generate_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.generate_url, error = %e, "generate request failed");
                ChatError::transport(format!("request to {} failed: {e}", self.generate_url))
            })?;
        check_status(response).await
    }
}

#[async_trait::async_trait]
impl Transport for OllamaTransport {
    async fn open_stream(&self, request: &GenerationRequest) -> Result<ByteStream, ChatError> {
        let response = self.post_generate(request, true).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChatError::from));
        Ok(Box::pin(stream))
    }

    async fn invoke_once(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, ChatError> {
        let response = self.post_generate(request, false).await?;
        response
            .json()
            .await
            .map_err(|e| ChatError::protocol(format!("invalid generate response body: {e}")))
    }

    async fn list_models(&self) -> Result<Vec<ModelTag>, ChatError> {
        let response = self
            .client
            .get(&self.tags_url)
            .send()
            .await
            .map_err(|e| ChatError::transport(format!("request to {} failed: {e}", self.tags_url)))?;
        let tags: TagsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ChatError::protocol(format!("invalid tags response body: {e}")))?;
        Ok(tags.models)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    error!(status = status.as_u16(), body = %body, "backend returned error status");
    Err(ChatError::backend_unavailable(status.as_u16(), body))
}

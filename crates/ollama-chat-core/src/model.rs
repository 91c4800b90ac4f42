use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::errors::ChatError;

/// One prompt submission. Immutable once handed to the client.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// Creates a request using the sampling settings from `config`.
    pub fn from_config(
        config: &ChatConfig,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: config.stream,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Returns a copy with the stream flag replaced.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChatError> {
        if self.model.trim().is_empty() {
            return Err(ChatError::Validation("model must not be empty".into()));
        }
        if self.prompt.trim().is_empty() {
            return Err(ChatError::Validation("prompt must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(ChatError::Validation(
                "max_tokens must be greater than 0".into(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ChatError::Validation(
                "temperature must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn to_body(&self) -> GenerateBody<'_> {
        self.to_body_with_stream(self.stream)
    }

    /// JSON body for `POST /api/generate` with an explicit stream flag.
    pub(crate) fn to_body_with_stream(&self, stream: bool) -> GenerateBody<'_> {
        GenerateBody {
            model: &self.model,
            prompt: &self.prompt,
            stream,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// A model entry reported by `GET /api/tags`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

/// Human-readable model name: drops the `:tag` suffix, turns `.` and `-`
/// into spaces and capitalizes each word.
///
/// ```
/// use ollama_chat_core::model::format_model_name;
/// assert_eq!(format_model_name("llama3.2:latest"), "Llama3 2");
/// assert_eq!(format_model_name("deepseek-coder:6.7b"), "Deepseek Coder");
/// ```
pub fn format_model_name(model: &str) -> String {
    let base = model.split(':').next().unwrap_or_default();
    if base.is_empty() {
        return "Unknown Model".to_string();
    }
    let spaced = base.replace(['.', '-'], " ");
    let mut out = String::with_capacity(spaced.len());
    let mut at_word_start = true;
    for ch in spaced.chars() {
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = ch.is_whitespace();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::from_config(&ChatConfig::default(), "llama3.2", "hello")
    }

    #[test]
    fn body_nests_sampling_options() {
        let body = serde_json::to_value(request().to_body()).expect("serialize");
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "hello");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 2048);
        assert!(body["options"]["temperature"].as_f64().is_some());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn validation_rejects_blank_prompt_and_model() {
        let mut req = request();
        req.prompt = "   ".into();
        assert!(matches!(req.validate(), Err(ChatError::Validation(msg)) if msg.contains("prompt")));
        let mut req = request();
        req.model.clear();
        assert!(matches!(req.validate(), Err(ChatError::Validation(msg)) if msg.contains("model")));
    }

    #[test]
    fn tags_response_tolerates_extra_fields() {
        let parsed: TagsResponse = serde_json::from_value(serde_json::json!({
            "models": [{"name": "mistral:7b", "size": 4109865159u64, "details": {"family": "llama"}}]
        }))
        .expect("parse");
        assert_eq!(parsed.models[0].name, "mistral:7b");
        assert_eq!(parsed.models[0].size, Some(4109865159));
    }

    #[test]
    fn unknown_model_name_for_empty_input() {
        assert_eq!(format_model_name(""), "Unknown Model");
    }
}

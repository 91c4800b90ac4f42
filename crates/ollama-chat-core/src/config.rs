use std::str::FromStr;
use std::time::Duration;

use crate::errors::ChatError;

/// Default address of a locally running Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client configuration.
///
/// Built once (usually from the environment plus command-line overrides) and
/// passed by value to [`ChatClient`](crate::ChatClient); nothing reads it
/// from global state afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the inference service, without the `/api/...` suffix.
    pub base_url: String,
    /// Model name. When unset the first model reported by `/api/tags` is used.
    pub model: Option<String>,
    /// Sampling temperature sent as `options.temperature`.
    pub temperature: f32,
    /// Token limit sent as `options.num_predict`.
    pub max_tokens: u32,
    /// Whether responses are streamed or fetched in one piece.
    pub stream: bool,
    /// TCP connect timeout. Generation itself has no timeout.
    pub connect_timeout: Duration,
    /// Bounded buffer between the stream pump task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            temperature: 0.7,
            max_tokens: 2048,
            stream: true,
            connect_timeout: Duration::from_secs(5),
            stream_buffer_capacity: 128,
        }
    }
}

impl ChatConfig {
    /// Builds a config from `OLLAMA_CHAT_*` environment variables on top of
    /// the defaults.
    ///
    /// Recognized keys: `OLLAMA_CHAT_BASE_URL`, `OLLAMA_CHAT_MODEL`,
    /// `OLLAMA_CHAT_TEMPERATURE`, `OLLAMA_CHAT_MAX_TOKENS`,
    /// `OLLAMA_CHAT_STREAM`.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ChatError> {
        let mut config = Self::default();
        if let Some(url) = non_blank(lookup("OLLAMA_CHAT_BASE_URL")) {
            config.base_url = url;
        }
        config.model = non_blank(lookup("OLLAMA_CHAT_MODEL"));
        if let Some(raw) = non_blank(lookup("OLLAMA_CHAT_TEMPERATURE")) {
            config.temperature = parse_value("OLLAMA_CHAT_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = non_blank(lookup("OLLAMA_CHAT_MAX_TOKENS")) {
            config.max_tokens = parse_value("OLLAMA_CHAT_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = non_blank(lookup("OLLAMA_CHAT_STREAM")) {
            config.stream = parse_bool(&raw).ok_or_else(|| {
                ChatError::Config(format!("OLLAMA_CHAT_STREAM is not a boolean: {raw}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Overrides the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Overrides the token limit.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Switches between streaming and single-shot generation.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.base_url.trim().is_empty() {
            return Err(ChatError::Config("base_url must not be empty".into()));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ChatError::Config(format!(
                "temperature must be a non-negative number, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ChatError::Config("max_tokens must be greater than 0".into()));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ChatError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ChatError> {
    raw.parse()
        .map_err(|_| ChatError::Config(format!("{key} has an invalid value: {raw}")))
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_local_server() {
        let config = ChatConfig::from_lookup(|_| None).expect("defaults");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, None);
        assert_eq!(config.max_tokens, 2048);
        assert!(config.stream);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn env_values_override_defaults() {
        let config = ChatConfig::from_lookup(lookup_from(&[
            ("OLLAMA_CHAT_BASE_URL", "http://gpu-box:11434/"),
            ("OLLAMA_CHAT_MODEL", "llama3.2"),
            ("OLLAMA_CHAT_TEMPERATURE", "0.2"),
            ("OLLAMA_CHAT_MAX_TOKENS", "512"),
            ("OLLAMA_CHAT_STREAM", "off"),
        ]))
        .expect("config");
        assert_eq!(config.model.as_deref(), Some("llama3.2"));
        assert_eq!(config.max_tokens, 512);
        assert!(!config.stream);
        assert_eq!(config.api_url("/api/tags"), "http://gpu-box:11434/api/tags");
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = ChatConfig::from_lookup(lookup_from(&[("OLLAMA_CHAT_MAX_TOKENS", "lots")]))
            .expect_err("should fail");
        assert!(matches!(err, ChatError::Config(msg) if msg.contains("OLLAMA_CHAT_MAX_TOKENS")));
    }

    #[test]
    fn validate_rejects_zero_tokens_and_negative_temperature() {
        assert!(ChatConfig::default().max_tokens(0).validate().is_err());
        assert!(ChatConfig::default().temperature(-1.0).validate().is_err());
    }
}

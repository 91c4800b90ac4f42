/// Errors produced by the chat client.
///
/// A user-initiated cancel is not represented here; it is a
/// [`SessionState`](crate::session::SessionState), not a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Backend answered with a non-success HTTP status.
    #[error("backend unavailable (status {status}): {body}")]
    BackendUnavailable { status: u16, body: String },
    /// No response was received, or the connection failed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend reported an `error` field for the generation.
    #[error("{0}")]
    Generation(String),
    /// Response body could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Invalid request input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Operation is not allowed in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),
    /// Chat history could not be read or written.
    #[error("store error: {0}")]
    Store(String),
}

impl ChatError {
    /// Creates a backend-unavailable error from a status code and body text.
    pub fn backend_unavailable(status: u16, body: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            status,
            body: body.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::BackendUnavailable { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text shown in the conversation when a turn ends with this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Generation(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(value: reqwest::Error) -> Self {
        ChatError::Transport(value.to_string())
    }
}

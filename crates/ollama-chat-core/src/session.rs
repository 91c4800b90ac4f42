use tracing::{debug, info, warn};

use crate::decoder::StreamEvent;
use crate::errors::ChatError;
use crate::model::GenerationRequest;
use crate::render::{RenderedBlock, escape_html, render, to_html};

/// Marker shown after the partial text of a cancelled generation.
pub const CANCELLED_MARKER: &str = "Generation stopped by user.";

/// Lifecycle of one prompt/response exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Cancelled,
    Completed,
    Failed,
}

impl SessionState {
    /// `Completed`, `Failed` and `Cancelled` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }
}

/// What a consumer observes after each processed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    /// New text arrived; `blocks` is the full re-rendered output.
    Render {
        delta: String,
        blocks: Vec<RenderedBlock>,
    },
    /// The stream finished normally.
    Completed { blocks: Vec<RenderedBlock> },
    /// The generation failed; `message` is shown verbatim.
    Failed { message: String },
    /// The user stopped the generation; `blocks` is what had been rendered.
    Cancelled { blocks: Vec<RenderedBlock> },
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Render { .. })
    }
}

/// State machine for a single generation.
///
/// Only the methods below mutate it, and text is append-only while
/// [`SessionState::Streaming`]. Once terminal the accumulated text is frozen.
#[derive(Clone, Debug)]
pub struct GenerationSession {
    id: uuid::Uuid,
    request: GenerationRequest,
    accumulated_text: String,
    state: SessionState,
    failure: Option<String>,
}

impl GenerationSession {
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            request,
            accumulated_text: String::new(),
            state: SessionState::Idle,
            failure: None,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    /// Failure text for a `Failed` session.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Idle -> Streaming.
    pub fn start(&mut self) -> Result<(), ChatError> {
        if self.state != SessionState::Idle {
            return Err(ChatError::InvalidState(format!(
                "cannot start a session in state {:?}",
                self.state
            )));
        }
        self.state = SessionState::Streaming;
        debug!(session_id = %self.id, model = %self.request.model, "session streaming");
        Ok(())
    }

    /// Processes one decoded event. Events arriving outside `Streaming` are
    /// ignored.
    pub fn apply(&mut self, event: StreamEvent) -> Option<SessionUpdate> {
        if self.state != SessionState::Streaming {
            debug!(session_id = %self.id, state = ?self.state, "ignoring event for inactive session");
            return None;
        }
        match event {
            StreamEvent::Token { text } => {
                self.accumulated_text.push_str(&text);
                Some(SessionUpdate::Render {
                    delta: text,
                    blocks: self.rendered(),
                })
            }
            StreamEvent::Error { message } => Some(self.enter_failed(message)),
            StreamEvent::Done => {
                self.state = SessionState::Completed;
                info!(
                    session_id = %self.id,
                    chars = self.accumulated_text.len(),
                    "generation completed"
                );
                Some(SessionUpdate::Completed {
                    blocks: self.rendered(),
                })
            }
        }
    }

    /// Ends the session with a transport or backend error.
    pub fn fail(&mut self, err: &ChatError) -> Option<SessionUpdate> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.enter_failed(err.user_message()))
    }

    /// Streaming -> Cancelled. Already rendered text is kept.
    pub fn cancel(&mut self) -> Option<SessionUpdate> {
        if self.state != SessionState::Streaming {
            return None;
        }
        self.state = SessionState::Cancelled;
        info!(session_id = %self.id, chars = self.accumulated_text.len(), "generation cancelled");
        Some(SessionUpdate::Cancelled {
            blocks: self.rendered(),
        })
    }

    /// Idle -> Completed for a single-shot response; renders exactly once.
    pub fn complete_once(&mut self, text: impl Into<String>) -> Result<SessionUpdate, ChatError> {
        if self.state != SessionState::Idle {
            return Err(ChatError::InvalidState(format!(
                "cannot complete a session in state {:?}",
                self.state
            )));
        }
        self.accumulated_text = text.into();
        self.state = SessionState::Completed;
        Ok(SessionUpdate::Completed {
            blocks: self.rendered(),
        })
    }

    /// Re-renders the accumulated text.
    pub fn rendered(&self) -> Vec<RenderedBlock> {
        render(&self.accumulated_text)
    }

    /// Text recorded in chat history for this turn.
    pub fn transcript_text(&self) -> String {
        match self.state {
            SessionState::Failed => {
                format!("Error: {}", self.failure.as_deref().unwrap_or_default())
            }
            SessionState::Cancelled if self.accumulated_text.is_empty() => {
                format!("[{CANCELLED_MARKER}]")
            }
            SessionState::Cancelled => {
                format!("{}\n\n[{CANCELLED_MARKER}]", self.accumulated_text)
            }
            _ => self.accumulated_text.clone(),
        }
    }

    /// Full HTML for the message, including the cancel marker or error text.
    pub fn display_html(&self) -> String {
        match self.state {
            SessionState::Failed => format!(
                "<span class=\"error\">Error: {}</span>",
                escape_html(self.failure.as_deref().unwrap_or_default())
            ),
            SessionState::Cancelled => {
                format!("{}<br><em>{CANCELLED_MARKER}</em>", to_html(&self.rendered()))
            }
            _ => to_html(&self.rendered()),
        }
    }

    fn enter_failed(&mut self, message: String) -> SessionUpdate {
        warn!(session_id = %self.id, error = %message, "generation failed");
        self.state = SessionState::Failed;
        self.failure = Some(message.clone());
        SessionUpdate::Failed { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;

    fn streaming_session() -> GenerationSession {
        let mut session = GenerationSession::new(GenerationRequest::from_config(
            &ChatConfig::default(),
            "llama3.2",
            "hi",
        ));
        session.start().expect("start");
        session
    }

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token { text: text.into() }
    }

    #[test]
    fn tokens_then_done_complete_the_session() {
        let mut session = streaming_session();
        for t in ["Hel", "lo ", "world"] {
            assert!(matches!(session.apply(token(t)), Some(SessionUpdate::Render { .. })));
        }
        let update = session.apply(StreamEvent::Done).expect("update");
        assert_eq!(session.accumulated_text(), "Hello world");
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(
            update,
            SessionUpdate::Completed {
                blocks: vec![RenderedBlock::Paragraph("Hello world".into())]
            }
        );
    }

    #[test]
    fn render_update_carries_delta_and_full_blocks() {
        let mut session = streaming_session();
        session.apply(token("`a"));
        let update = session.apply(token("`")).expect("update");
        assert_eq!(
            update,
            SessionUpdate::Render {
                delta: "`".into(),
                blocks: vec![RenderedBlock::InlineCode("a".into())]
            }
        );
    }

    #[test]
    fn error_event_fails_and_freezes_text() {
        let mut session = streaming_session();
        session.apply(token("partial"));
        let update = session.apply(StreamEvent::Error {
            message: "out of memory".into(),
        });
        assert_eq!(
            update,
            Some(SessionUpdate::Failed {
                message: "out of memory".into()
            })
        );
        assert_eq!(session.apply(token("more")), None);
        assert_eq!(session.accumulated_text(), "partial");
        assert_eq!(session.transcript_text(), "Error: out of memory");
    }

    #[test]
    fn cancel_keeps_rendered_text_and_ignores_later_events() {
        let mut session = streaming_session();
        session.apply(token("Hel"));
        let update = session.cancel().expect("cancelled");
        assert_eq!(
            update,
            SessionUpdate::Cancelled {
                blocks: vec![RenderedBlock::Paragraph("Hel".into())]
            }
        );
        assert_eq!(session.apply(token("lo")), None);
        assert_eq!(session.apply(StreamEvent::Done), None);
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.accumulated_text(), "Hel");
        assert!(session.display_html().ends_with("<em>Generation stopped by user.</em>"));
        assert_eq!(session.cancel(), None);
    }

    #[test]
    fn start_twice_is_invalid() {
        let mut session = streaming_session();
        assert!(matches!(session.start(), Err(ChatError::InvalidState(_))));
    }

    #[test]
    fn events_before_start_are_ignored() {
        let mut session = GenerationSession::new(GenerationRequest::from_config(
            &ChatConfig::default(),
            "m",
            "p",
        ));
        assert_eq!(session.apply(token("x")), None);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn complete_once_renders_full_text() {
        let mut session = GenerationSession::new(GenerationRequest::from_config(
            &ChatConfig::default(),
            "m",
            "p",
        ));
        let update = session.complete_once("```sh\nls\n```").expect("complete");
        assert_eq!(session.state(), SessionState::Completed);
        assert!(update.is_terminal());
        assert!(matches!(
            update,
            SessionUpdate::Completed { blocks } if blocks.len() == 1
        ));
    }

    #[test]
    fn failed_display_escapes_message() {
        let mut session = streaming_session();
        session.fail(&ChatError::backend_unavailable(500, "<boom>"));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.display_html().contains("&lt;boom&gt;"));
        assert_eq!(session.failure(), Some("backend unavailable (status 500): <boom>"));
    }
}

//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ChatClient, ChatConfig, ChatError, Conversation, GenerationRequest,
    GenerationRun, GenerationSession, RenderedBlock, SessionState, SessionUpdate, StreamEvent,
};

//! The seam between the feedback flows and whatever produces text.
//!
//! Production code talks to an OpenAI-compatible endpoint through
//! [`crate::core::chat_stream::ChatClient`]; tests substitute scripted
//! fragment sequences.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::core::message::Message;
use crate::core::structured::{StructuredFeedback, StructuredFeedbackError};

/// A lazy, finite, non-restartable sequence of text fragments.
pub type FragmentStream = BoxStream<'static, Result<String, StreamError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The request never produced a response (connect, TLS, body read).
    Transport(String),
    /// The provider answered with an error payload or status.
    Api(String),
    /// The producer went away without signalling the end of the stream.
    Disconnected,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Transport(message) => write!(f, "transport error: {message}"),
            StreamError::Api(message) => write!(f, "{message}"),
            StreamError::Disconnected => write!(f, "stream ended without completion"),
        }
    }
}

impl Error for StreamError {}

/// A conversation to send: an optional role instruction plus ordered turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub instruction: Option<String>,
    pub messages: Vec<Message>,
}

impl GenerationRequest {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            instruction: None,
            messages: vec![Message::user(text)],
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a streamed completion. Failures before the first fragment are
    /// reported here; failures after it arrive as stream items.
    async fn stream_text(&self, request: GenerationRequest) -> Result<FragmentStream, StreamError>;

    /// One-shot request for a feedback object with suggested questions.
    async fn generate_structured(
        &self,
        request: GenerationRequest,
    ) -> Result<StructuredFeedback, StructuredFeedbackError>;
}

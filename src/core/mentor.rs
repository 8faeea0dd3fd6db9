//! Free-form conversation with the AI mentor.
//!
//! A [`MentorSession`] is created by whoever runs the conversation and passed
//! around by reference. It owns the history and the role instruction, and
//! sends are sequential by construction (`&mut self`).

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::constants::{FOLLOW_UP_ERROR_MESSAGE, MENTOR_ERROR_MESSAGE, MENTOR_INSTRUCTION};
use crate::core::decoder::StreamOutcome;
use crate::core::follow_up::FollowUpSplice;
use crate::core::generator::{FragmentStream, GenerationRequest, TextGenerator};
use crate::core::message::Message;

pub struct MentorSession {
    generator: Arc<dyn TextGenerator>,
    instruction: String,
    messages: Vec<Message>,
}

impl MentorSession {
    pub fn new(generator: Arc<dyn TextGenerator>, user_name: Option<&str>) -> Self {
        let instruction = match user_name {
            Some(name) if !name.trim().is_empty() => format!(
                "{MENTOR_INSTRUCTION} 대화 상대는 신입 사원 {}님입니다.",
                name.trim()
            ),
            _ => MENTOR_INSTRUCTION.to_string(),
        };
        Self {
            generator,
            instruction,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.is_assistant())
            .map(|m| m.content.as_str())
    }

    /// Send a user turn and stream the reply into a new assistant message.
    /// `on_update` sees the reply text after every fragment.
    pub async fn send<F>(
        &mut self,
        text: &str,
        stop: &CancellationToken,
        mut on_update: F,
    ) -> StreamOutcome
    where
        F: FnMut(&str),
    {
        self.messages.push(Message::user(text));
        let request = GenerationRequest {
            instruction: Some(self.instruction.clone()),
            messages: self.messages.clone(),
        };
        self.messages.push(Message::assistant(""));
        debug!(turns = self.messages.len(), "mentor turn");

        let mut fragments = match self.open(request, stop).await {
            Ok(Some(fragments)) => fragments,
            Ok(None) => {
                self.abandon_unanswered_turn();
                return StreamOutcome::Cancelled;
            }
            Err(()) => {
                self.fail_reply(&mut on_update);
                return StreamOutcome::Failed;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    self.abandon_unanswered_turn();
                    return StreamOutcome::Cancelled;
                }
                next = fragments.next() => next,
            };
            match next {
                Some(Ok(fragment)) => {
                    if let Some(reply) = self.messages.last_mut() {
                        reply.content.push_str(&fragment);
                        on_update(&reply.content);
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "mentor stream failed");
                    self.fail_reply(&mut on_update);
                    return StreamOutcome::Failed;
                }
                None => return StreamOutcome::Completed,
            }
        }
    }

    /// Answer a free-text question about the last reply, spliced under a
    /// heading into that same reply instead of starting a new turn.
    pub async fn follow_up<F>(
        &mut self,
        question: &str,
        stop: &CancellationToken,
        mut on_update: F,
    ) -> StreamOutcome
    where
        F: FnMut(&str),
    {
        if self.last_reply().is_none() {
            return self.send(question, stop, on_update).await;
        }

        let mut history = self.messages.clone();
        history.push(Message::user(question));
        let request = GenerationRequest {
            instruction: Some(self.instruction.clone()),
            messages: history,
        };

        let mut splice = match self.messages.last_mut() {
            Some(reply) => {
                let splice = FollowUpSplice::start(&mut reply.content, question);
                on_update(&reply.content);
                splice
            }
            None => return StreamOutcome::Cancelled,
        };
        debug!(turns = self.messages.len(), "mentor follow-up");

        let mut fragments = match self.open(request, stop).await {
            Ok(Some(fragments)) => fragments,
            Ok(None) => return StreamOutcome::Cancelled,
            Err(()) => {
                self.append_to_reply(FOLLOW_UP_ERROR_MESSAGE, &mut on_update);
                return StreamOutcome::Failed;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => return StreamOutcome::Cancelled,
                next = fragments.next() => next,
            };
            match next {
                Some(Ok(fragment)) => {
                    if let Some(reply) = self.messages.last_mut() {
                        splice.apply(&mut reply.content, &fragment);
                        on_update(&reply.content);
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "mentor follow-up stream failed");
                    self.append_to_reply(FOLLOW_UP_ERROR_MESSAGE, &mut on_update);
                    return StreamOutcome::Failed;
                }
                None => return StreamOutcome::Completed,
            }
        }
    }

    async fn open(
        &self,
        request: GenerationRequest,
        stop: &CancellationToken,
    ) -> Result<Option<FragmentStream>, ()> {
        let result = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(None),
            result = self.generator.stream_text(request) => result,
        };
        result.map(Some).map_err(|err| {
            warn!(error = %err, "mentor request failed");
        })
    }

    /// Drop the last user/assistant pair when the reply never got any text,
    /// so later requests do not carry an empty assistant turn.
    fn abandon_unanswered_turn(&mut self) {
        if self.last_reply() == Some("") {
            self.messages.pop();
            if self.messages.last().is_some_and(Message::is_user) {
                self.messages.pop();
            }
        }
    }

    fn fail_reply<F: FnMut(&str)>(&mut self, on_update: &mut F) {
        if let Some(reply) = self.messages.last_mut() {
            reply.content = MENTOR_ERROR_MESSAGE.to_string();
            on_update(&reply.content);
        }
    }

    fn append_to_reply<F: FnMut(&str)>(&mut self, text: &str, on_update: &mut F) {
        if let Some(reply) = self.messages.last_mut() {
            reply.content.push_str(text);
            on_update(&reply.content);
        }
    }
}

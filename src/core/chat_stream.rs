//! OpenAI-compatible chat completions client.
//!
//! Streaming requests run on a spawned task that reads the SSE body and
//! forwards [`StreamMessage`]s over a channel; [`ChatClient::stream_text`]
//! adapts the receiving end into a [`FragmentStream`]. Dropping that stream
//! cancels the task.

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::api::{
    endpoint_url, ChatMessage, ChatRequest, ChatResponse, CompletionResponse, JsonSchemaFormat,
    ResponseFormat,
};
use crate::core::generator::{FragmentStream, GenerationRequest, StreamError, TextGenerator};
use crate::core::structured::{
    feedback_schema, parse_structured_feedback, StructuredFeedback, StructuredFeedbackError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Returns true once the stream is over.
fn handle_data_payload(payload: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(StreamMessage::End);
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(content) = response
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_ref())
            {
                if !content.is_empty() {
                    let _ = tx.send(StreamMessage::Chunk(content.clone()));
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }
            let _ = tx.send(StreamMessage::Error(format_api_error(payload)));
            let _ = tx.send(StreamMessage::End);
            true
        }
    }
}

fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx))
        .unwrap_or(false)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .or_else(|| value.get("message").and_then(|v| v.as_str()))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Condense a provider error body into one line for logs.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "API error: <empty body>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&value).filter(|s| !s.is_empty()) {
            return format!("API error: {summary}");
        }
        return format!("API error: {value}");
    }

    format!("API error: {trimmed}")
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                model,
                api_messages,
                cancel_token,
            } = params;

            let request = ChatRequest {
                model,
                messages: api_messages,
                stream: true,
                response_format: None,
            };

            tokio::select! {
                _ = run_stream(&client, &base_url, &api_key, &request, &tx, &cancel_token) => {}
                _ = cancel_token.cancelled() => {
                    debug!("chat stream cancelled");
                }
            }
        });
    }
}

async fn run_stream(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: &ChatRequest,
    tx: &mpsc::UnboundedSender<StreamMessage>,
    cancel_token: &CancellationToken,
) {
    let response = match client
        .post(endpoint_url(base_url, "chat/completions"))
        .bearer_auth(api_key)
        .json(request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(StreamMessage::Error(format_api_error(&e.to_string())));
            let _ = tx.send(StreamMessage::End);
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        warn!(%status, "chat completion rejected");
        let _ = tx.send(StreamMessage::Error(format_api_error(&error_text)));
        let _ = tx.send(StreamMessage::End);
        return;
    }

    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        if cancel_token.is_cancelled() {
            return;
        }

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(StreamMessage::Error(format_api_error(&e.to_string())));
                let _ = tx.send(StreamMessage::End);
                return;
            }
        };
        buffer.extend_from_slice(&chunk);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let should_end = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(line) => process_sse_line(line.trim(), tx),
                Err(e) => {
                    warn!("invalid UTF-8 in stream: {e}");
                    false
                }
            };
            buffer.drain(..=newline_pos);
            if should_end {
                return;
            }
        }
    }

    let _ = tx.send(StreamMessage::End);
}

struct FragmentState {
    rx: mpsc::UnboundedReceiver<StreamMessage>,
    finished: bool,
    _guard: DropGuard,
}

/// Adapt a channel of [`StreamMessage`]s into fragments. The guard cancels
/// the producer when the stream is dropped.
fn into_fragments(rx: mpsc::UnboundedReceiver<StreamMessage>, guard: DropGuard) -> FragmentStream {
    let state = FragmentState {
        rx,
        finished: false,
        _guard: guard,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        let item = match state.rx.recv().await {
            Some(StreamMessage::Chunk(content)) => Ok(content),
            Some(StreamMessage::Error(message)) => {
                state.finished = true;
                Err(StreamError::Api(message))
            }
            Some(StreamMessage::End) => return None,
            None => {
                state.finished = true;
                Err(StreamError::Disconnected)
            }
        };
        Some((item, state))
    })
    .boxed()
}

pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn api_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
        request
            .instruction
            .iter()
            .map(ChatMessage::system)
            .chain(request.messages.iter().map(ChatMessage::from))
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn stream_text(&self, request: GenerationRequest) -> Result<FragmentStream, StreamError> {
        let cancel_token = CancellationToken::new();
        let guard = cancel_token.clone().drop_guard();
        let (service, rx) = ChatStreamService::new();

        debug!(model = %self.model, turns = request.messages.len(), "starting chat stream");
        service.spawn_stream(StreamParams {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            api_messages: Self::api_messages(&request),
            cancel_token,
        });

        Ok(into_fragments(rx, guard))
    }

    async fn generate_structured(
        &self,
        request: GenerationRequest,
    ) -> Result<StructuredFeedback, StructuredFeedbackError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: Self::api_messages(&request),
            stream: false,
            response_format: Some(ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "scenario_feedback",
                    strict: true,
                    schema: feedback_schema(),
                },
            }),
        };

        let response = self
            .client
            .post(endpoint_url(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StructuredFeedbackError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StructuredFeedbackError::Request(format_api_error(
                &error_text,
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| StructuredFeedbackError::Request(e.to_string()))?;
        let content = completion
            .first_content()
            .ok_or(StructuredFeedbackError::Empty)?;
        parse_structured_feedback(content)
    }
}

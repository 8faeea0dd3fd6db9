//! Wire payloads for the OpenAI-compatible chat completions endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::Message;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
pub struct JsonSchemaFormat {
    pub name: &'static str,
    pub strict: bool,
    pub schema: Value,
}

#[derive(Deserialize)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    pub delta: ChatResponseDelta,
}

/// One SSE `data:` chunk of a streamed completion.
#[derive(Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
}

#[derive(Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

/// Body of a non-streamed completion.
#[derive(Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

impl CompletionResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

/// Join a base URL and an endpoint path without doubling or dropping slashes.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_normalizes_slashes() {
        assert_eq!(
            endpoint_url("https://api.example.com/v1/", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint_url("https://api.example.com/v1", "chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn request_omits_response_format_when_streaming() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::from(&Message::user("hi"))],
            stream: true,
            response_format: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn completion_response_exposes_first_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{}"}}]}"#;
        let response: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.first_content(), Some("{}"));
    }
}

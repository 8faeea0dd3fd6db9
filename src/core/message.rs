use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a mentor conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl TryFrom<&str> for ChatRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(ChatRole::User),
            // Gemini-style transcripts call the assistant "model".
            "assistant" | "model" => Ok(ChatRole::Assistant),
            _ => Err(format!("invalid chat role: {value}")),
        }
    }
}

impl TryFrom<String> for ChatRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<ChatRole> for String {
    fn from(value: ChatRole) -> Self {
        value.as_str().to_string()
    }
}

impl Message {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == ChatRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == ChatRole::Assistant
    }
}

//! Typed contract for the one-shot structured feedback response.
//!
//! The provider is asked for a JSON object with a `feedback` string and a
//! `followUpQuestions` string array. The reply is deserialized strictly:
//! missing, unknown or mistyped fields are rejected before anything
//! downstream sees it.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StructuredFeedback {
    pub feedback: String,
    pub follow_up_questions: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StructuredFeedbackError {
    /// The provider returned no content at all.
    Empty,
    /// The content was not valid JSON.
    Malformed(String),
    /// Valid JSON of the wrong shape: a missing, unknown or mistyped field.
    Invalid(String),
    /// The request itself failed.
    Request(String),
}

impl fmt::Display for StructuredFeedbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuredFeedbackError::Empty => write!(f, "structured response was empty"),
            StructuredFeedbackError::Malformed(detail) => {
                write!(f, "structured response is not valid JSON: {detail}")
            }
            StructuredFeedbackError::Invalid(detail) => {
                write!(f, "structured response has the wrong shape: {detail}")
            }
            StructuredFeedbackError::Request(detail) => {
                write!(f, "structured request failed: {detail}")
            }
        }
    }
}

impl Error for StructuredFeedbackError {}

/// JSON schema sent alongside the request.
pub fn feedback_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "feedback": { "type": "string" },
            "followUpQuestions": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["feedback", "followUpQuestions"],
        "additionalProperties": false
    })
}

pub fn parse_structured_feedback(raw: &str) -> Result<StructuredFeedback, StructuredFeedbackError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StructuredFeedbackError::Empty);
    }

    serde_json::from_str(strip_code_fence(trimmed)).map_err(|e| match e.classify() {
        Category::Data => StructuredFeedbackError::Invalid(e.to_string()),
        Category::Io | Category::Syntax | Category::Eof => {
            StructuredFeedbackError::Malformed(e.to_string())
        }
    })
}

// Some models wrap JSON in a ```json fence even when asked for a schema.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_payload() {
        let raw = r#"{"feedback":"좋은 선택입니다.","followUpQuestions":["왜?","어떻게?"]}"#;
        let parsed = parse_structured_feedback(raw).unwrap();
        assert_eq!(parsed.feedback, "좋은 선택입니다.");
        assert_eq!(parsed.follow_up_questions, vec!["왜?", "어떻게?"]);
    }

    #[test]
    fn accepts_fenced_json() {
        let raw = "```json\n{\"feedback\":\"ok\",\"followUpQuestions\":[]}\n```";
        let parsed = parse_structured_feedback(raw).unwrap();
        assert_eq!(parsed.feedback, "ok");
        assert!(parsed.follow_up_questions.is_empty());
    }

    fn invalid_detail(raw: &str) -> String {
        match parse_structured_feedback(raw) {
            Err(StructuredFeedbackError::Invalid(detail)) => detail,
            other => panic!("expected a shape error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(invalid_detail(r#"{"followUpQuestions":[]}"#).contains("missing field `feedback`"));
        assert!(invalid_detail(r#"{"feedback":"x"}"#).contains("missing field `followUpQuestions`"));
    }

    #[test]
    fn rejects_non_string_questions() {
        assert!(
            invalid_detail(r#"{"feedback":"x","followUpQuestions":["a",3]}"#)
                .contains("invalid type")
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(
            invalid_detail(r#"{"feedback":"x","followUpQuestions":[],"score":3}"#)
                .contains("unknown field `score`")
        );
    }

    #[test]
    fn rejects_empty_and_unparsable_content() {
        assert_eq!(
            parse_structured_feedback("  "),
            Err(StructuredFeedbackError::Empty)
        );
        assert!(matches!(
            parse_structured_feedback("{\"feedback\": "),
            Err(StructuredFeedbackError::Malformed(_))
        ));
        assert!(matches!(
            parse_structured_feedback("좋은 선택입니다"),
            Err(StructuredFeedbackError::Malformed(_))
        ));
    }

    #[test]
    fn schema_requires_both_fields() {
        let schema = feedback_schema();
        assert_eq!(schema["required"], json!(["feedback", "followUpQuestions"]));
    }
}

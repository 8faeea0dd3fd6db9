//! Thin client for the onboarding REST backend.
//!
//! The backend owns sessions, progress and quizzes; this client only shapes
//! requests and decodes responses.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::endpoint_url;
use crate::core::quiz::{QuizQuestion, QuizScore};

#[derive(Debug)]
pub enum BackendError {
    Request(reqwest::Error),
    Status { status: u16, body: String },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Request(err) => write!(f, "backend request failed: {err}"),
            BackendError::Status { status, body } if body.is_empty() => {
                write!(f, "backend returned HTTP {status}")
            }
            BackendError::Status { status, body } => {
                write!(f, "backend returned HTTP {status}: {body}")
            }
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Request(err) => Some(err),
            BackendError::Status { .. } => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Request(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSession {
    pub id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub exercise_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSession<'a> {
    user_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewProgress<'a> {
    exercise_id: &'a str,
}

#[derive(Serialize)]
struct QuizSubmission<'a> {
    answers: &'a HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub score: QuizScore,
    pub passed: bool,
}

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl BackendClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            access_token: None,
        }
    }

    /// Attach the bearer token issued by the auth provider.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = endpoint_url(&self.base_url, path);
        debug!(%method, %url, "backend request");
        let builder = self.client.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, BackendError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn create_session(&self, user_name: &str) -> Result<BackendSession, BackendError> {
        Self::send(
            self.request(Method::POST, "sessions")
                .json(&NewSession { user_name }),
        )
        .await
    }

    pub async fn list_progress(&self, user_name: &str) -> Result<Vec<ProgressRecord>, BackendError> {
        Self::send(self.request(Method::GET, &progress_path(user_name))).await
    }

    pub async fn record_completion(
        &self,
        user_name: &str,
        exercise_id: &str,
    ) -> Result<ProgressRecord, BackendError> {
        Self::send(
            self.request(Method::POST, &progress_path(user_name))
                .json(&NewProgress { exercise_id }),
        )
        .await
    }

    pub async fn quiz_questions(&self, quiz_id: &str) -> Result<Vec<QuizQuestion>, BackendError> {
        let path = format!("quizzes/{}/questions", urlencoding::encode(quiz_id));
        Self::send(self.request(Method::GET, &path)).await
    }

    pub async fn submit_quiz(
        &self,
        quiz_id: &str,
        answers: &HashMap<String, usize>,
    ) -> Result<QuizResult, BackendError> {
        Self::send(
            self.request(
                Method::POST,
                &format!("quizzes/{}/submissions", urlencoding::encode(quiz_id)),
            )
            .json(&QuizSubmission { answers }),
        )
        .await
    }
}

fn progress_path(user_name: &str) -> String {
    format!("users/{}/progress", urlencoding::encode(user_name))
}

/// Distinct exercise ids the backend reports as completed.
pub fn completed_ids(records: &[ProgressRecord]) -> Vec<&str> {
    let mut ids: Vec<&str> = records.iter().map(|r| r.exercise_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

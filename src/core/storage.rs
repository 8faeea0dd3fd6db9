//! Signed download links for uploaded onboarding documents.
//!
//! Everything this needs (storage URL, bucket, link lifetime) is read from
//! configuration when a link is requested, not at startup. A missing or zero
//! lifetime refuses to generate anything.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::endpoint_url;
use crate::core::config::{ConfigError, StorageConfig};

#[derive(Debug)]
pub enum StorageError {
    Config(ConfigError),
    Request(reqwest::Error),
    Status(u16),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Config(err) => write!(f, "storage is not configured: {err}"),
            StorageError::Request(err) => write!(f, "storage request failed: {err}"),
            StorageError::Status(status) => write!(f, "storage returned HTTP {status}"),
        }
    }
}

impl Error for StorageError {}

impl From<ConfigError> for StorageError {
    fn from(err: ConfigError) -> Self {
        StorageError::Config(err)
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Request(err)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Where a signed link should point and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignTarget {
    pub endpoint: String,
    pub ttl: Duration,
}

/// Resolve the sign endpoint for `object_path`, failing closed on any
/// missing setting.
pub fn sign_target(storage: &StorageConfig, object_path: &str) -> Result<SignTarget, ConfigError> {
    let ttl = storage.signed_url_ttl()?;
    let bucket = storage.bucket()?;
    let base = storage.url()?;

    let object = object_path
        .trim_start_matches('/')
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");

    Ok(SignTarget {
        endpoint: endpoint_url(
            base,
            &format!("object/sign/{}/{object}", urlencoding::encode(bucket)),
        ),
        ttl,
    })
}

pub struct StorageClient {
    client: reqwest::Client,
    storage: StorageConfig,
    access_token: Option<String>,
}

impl StorageClient {
    pub fn new(client: reqwest::Client, storage: StorageConfig) -> Self {
        Self {
            client,
            storage,
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub async fn signed_url(&self, object_path: &str) -> Result<String, StorageError> {
        let target = sign_target(&self.storage, object_path)?;
        debug!(endpoint = %target.endpoint, ttl = ?target.ttl, "signing storage object");

        let mut request = self.client.post(&target.endpoint).json(&SignRequest {
            expires_in: target.ttl.as_secs(),
        });
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StorageError::Status(response.status().as_u16()));
        }
        let signed: SignResponse = response.json().await?;
        Ok(absolute_signed_url(self.storage.url()?, &signed.signed_url))
    }
}

/// Storage answers with a path relative to its own base URL.
fn absolute_signed_url(base: &str, signed: &str) -> String {
    if signed.starts_with("http://") || signed.starts_with("https://") {
        signed.to_string()
    } else {
        endpoint_url(base, signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> StorageConfig {
        StorageConfig {
            url: Some("https://files.example.com/storage/v1/".to_string()),
            bucket: Some("onboarding-docs".to_string()),
            signed_url_ttl_secs: Some(3600),
        }
    }

    #[test]
    fn sign_target_builds_encoded_endpoint() {
        let target = sign_target(&configured(), "/hr/입사 안내.pdf").unwrap();
        assert_eq!(
            target.endpoint,
            "https://files.example.com/storage/v1/object/sign/onboarding-docs/hr/%EC%9E%85%EC%82%AC%20%EC%95%88%EB%82%B4.pdf"
        );
        assert_eq!(target.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn sign_target_fails_closed_without_ttl() {
        let mut storage = configured();
        storage.signed_url_ttl_secs = Some(0);
        assert!(matches!(
            sign_target(&storage, "a.pdf"),
            Err(ConfigError::Missing("signed-url-ttl"))
        ));
        storage.signed_url_ttl_secs = None;
        assert!(sign_target(&storage, "a.pdf").is_err());
    }

    #[test]
    fn sign_target_requires_bucket() {
        let mut storage = configured();
        storage.bucket = None;
        assert!(matches!(
            sign_target(&storage, "a.pdf"),
            Err(ConfigError::Missing("storage-bucket"))
        ));
    }

    #[tokio::test]
    async fn signed_url_reports_config_error_before_any_request() {
        let client = StorageClient::new(reqwest::Client::new(), StorageConfig::default());
        let err = client.signed_url("a.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::Config(ConfigError::Missing(_))));
    }

    #[test]
    fn relative_signed_paths_are_joined_to_base() {
        assert_eq!(
            absolute_signed_url(
                "https://files.example.com/storage/v1",
                "/object/sign/b/a.pdf?token=t"
            ),
            "https://files.example.com/storage/v1/object/sign/b/a.pdf?token=t"
        );
        assert_eq!(
            absolute_signed_url("https://x", "https://cdn.example.com/a?token=t"),
            "https://cdn.example.com/a?token=t"
        );
    }
}

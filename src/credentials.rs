//! Ephemeral feed credentials.
//!
//! Before opening the real-time feed, a stream client exchanges its session id
//! for a bearer token and a feed URL. The platform secret stays on the server:
//! [`LocalCredentialIssuer`] holds it and backs both the `/api/agent-events`
//! endpoint and in-process streams, while [`HttpCredentialProvider`] talks to
//! that endpoint over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Query parameter carrying the bearer token on the feed URL.
pub const API_KEY_QUERY_PARAM: &str = "x-api-key";

/// Token and URL template for one feed connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    /// `wss://<host>/session/<session_id>`
    pub ws_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

impl Credentials {
    /// Feed URL with the token appended as a query credential.
    pub fn feed_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.ws_url)?;
        url.query_pairs_mut()
            .append_pair(API_KEY_QUERY_PARAM, &self.api_key);
        Ok(url)
    }
}

/// Source of feed credentials for a session.
#[async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, session_id: &str) -> Result<Credentials>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

/// Request body of the credential endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response envelope of the credential endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CredentialResponse {
    #[must_use]
    pub fn issued(credentials: Credentials) -> Self {
        Self {
            success: true,
            api_key: Some(credentials.api_key),
            ws_url: Some(credentials.ws_url),
            error: None,
        }
    }

    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            api_key: None,
            ws_url: None,
            error: Some(error.into()),
        }
    }

    /// Anything short of `success: true` with both fields present is a failure.
    pub fn into_credentials(self) -> Result<Credentials> {
        if !self.success {
            return Err(Error::Credentials(
                self.error
                    .unwrap_or_else(|| "credential endpoint reported failure".to_string()),
            ));
        }
        match (self.api_key, self.ws_url) {
            (Some(api_key), Some(ws_url)) => Ok(Credentials { api_key, ws_url }),
            _ => Err(Error::Credentials(
                "credential response missing apiKey or wsUrl".to_string(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process issuer
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons the issuer refuses a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueError {
    #[error("session_id is required")]
    MissingSession,
    #[error("platform API key not configured on server")]
    NotConfigured,
}

/// Issues credentials from the server-side platform secret.
#[derive(Clone)]
pub struct LocalCredentialIssuer {
    api_key: String,
    feed_base_url: String,
}

impl std::fmt::Debug for LocalCredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCredentialIssuer")
            .field("configured", &self.is_configured())
            .field("feed_base_url", &self.feed_base_url)
            .finish()
    }
}

impl LocalCredentialIssuer {
    pub fn new(api_key: impl Into<String>, feed_base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            feed_base_url: feed_base_url.into(),
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn issue(&self, session_id: &str) -> std::result::Result<Credentials, IssueError> {
        if session_id.trim().is_empty() {
            return Err(IssueError::MissingSession);
        }
        if !self.is_configured() {
            return Err(IssueError::NotConfigured);
        }
        Ok(Credentials {
            api_key: self.api_key.clone(),
            ws_url: format!(
                "{}/{}",
                self.feed_base_url.trim_end_matches('/'),
                session_id
            ),
        })
    }
}

#[async_trait]
impl CredentialProvider for LocalCredentialIssuer {
    async fn fetch(&self, session_id: &str) -> Result<Credentials> {
        self.issue(session_id)
            .map_err(|e| Error::Credentials(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP provider
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches credentials from a remote credential endpoint.
#[derive(Debug, Clone)]
pub struct HttpCredentialProvider {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpCredentialProvider {
    pub fn new(endpoint: impl AsRef<str>) -> Result<Self> {
        Self::with_client(endpoint, reqwest::Client::new())
    }

    pub fn with_client(endpoint: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint.as_ref())?,
            http,
        })
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch(&self, session_id: &str) -> Result<Credentials> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&CredentialRequest {
                session_id: Some(session_id.to_string()),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CredentialResponse = response.json().await?;
        body.into_credentials()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_feed_url_appends_encoded_key() {
        let credentials = Credentials {
            api_key: "sk/abc=123&x".to_string(),
            ws_url: "wss://metrics.example.com/session/session_1_abc".to_string(),
        };
        let url = credentials.feed_url().unwrap();
        assert_eq!(url.host_str(), Some("metrics.example.com"));
        assert_eq!(url.path(), "/session/session_1_abc");
        let pairs: Vec<_> = url.query_pairs().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, API_KEY_QUERY_PARAM);
        assert_eq!(pairs[0].1, "sk/abc=123&x");
        assert!(!url.as_str().contains("&x"));
    }

    #[test]
    fn test_feed_url_rejects_garbage() {
        let credentials = Credentials {
            api_key: "k".to_string(),
            ws_url: "not a url".to_string(),
        };
        assert!(matches!(credentials.feed_url(), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let credentials = Credentials {
            api_key: "super-secret".to_string(),
            ws_url: "wss://h/session/s".to_string(),
        };
        assert!(!format!("{credentials:?}").contains("super-secret"));

        let issuer = LocalCredentialIssuer::new("super-secret", "wss://h/session");
        assert!(!format!("{issuer:?}").contains("super-secret"));
    }

    #[test]
    fn test_issuer_rules() {
        let issuer = LocalCredentialIssuer::new("key", "wss://metrics.example.com/session/");
        let credentials = issuer.issue("session_1_abc").unwrap();
        assert_eq!(
            credentials.ws_url,
            "wss://metrics.example.com/session/session_1_abc"
        );
        assert_eq!(issuer.issue(""), Err(IssueError::MissingSession));

        let unconfigured = LocalCredentialIssuer::new("  ", "wss://metrics.example.com/session");
        assert_eq!(unconfigured.issue("s"), Err(IssueError::NotConfigured));
    }

    #[test]
    fn test_response_envelope() {
        let ok: CredentialResponse =
            serde_json::from_value(json!({"success": true, "apiKey": "k", "wsUrl": "wss://h/session/s"}))
                .unwrap();
        assert_eq!(ok.into_credentials().unwrap().api_key, "k");

        let failed: CredentialResponse =
            serde_json::from_value(json!({"success": false, "error": "nope"})).unwrap();
        assert!(matches!(failed.into_credentials(), Err(Error::Credentials(m)) if m == "nope"));

        let partial: CredentialResponse =
            serde_json::from_value(json!({"success": true, "apiKey": "k"})).unwrap();
        assert!(matches!(partial.into_credentials(), Err(Error::Credentials(_))));
    }

    #[tokio::test]
    async fn test_http_provider_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/agent-events")
                    .json_body(json!({"session_id": "session_1_abc"}));
                then.status(200).json_body(json!({
                    "success": true,
                    "apiKey": "k-123",
                    "wsUrl": "wss://metrics.example.com/session/session_1_abc"
                }));
            })
            .await;

        let provider = HttpCredentialProvider::new(server.url("/api/agent-events")).unwrap();
        let credentials = provider.fetch("session_1_abc").await.unwrap();

        mock.assert_async().await;
        assert_eq!(credentials.api_key, "k-123");
        assert_eq!(
            credentials.ws_url,
            "wss://metrics.example.com/session/session_1_abc"
        );
    }

    #[tokio::test]
    async fn test_http_provider_non_success_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/agent-events");
                then.status(500)
                    .json_body(json!({"success": false, "error": "not configured"}));
            })
            .await;

        let provider = HttpCredentialProvider::new(server.url("/api/agent-events")).unwrap();
        let err = provider.fetch("s").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, .. }));
    }
}

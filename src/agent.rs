//! Client for the hosted agent's request/response call.
//!
//! The agent answers free text with a loosely structured result. The useful
//! parts (display text, insights, a recommendation) may sit at the top level
//! or inside a `response` field that is either an object or a JSON-encoded
//! string, so extraction is tolerant.

use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

/// Display text used when the agent returns nothing usable.
pub const NO_RESPONSE: &str = "No response received.";

/// Structured reply shown in the assistant panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentReply {
    pub response: String,
    pub insights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl AgentReply {
    /// Extract a reply from the agent's JSON body.
    #[must_use]
    pub fn from_value(body: &Value) -> Self {
        let payload = body.get("response");
        let result = match payload {
            Some(Value::Object(_)) => payload.cloned(),
            Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
                .ok()
                .filter(Value::is_object),
            _ => None,
        };

        let response = result
            .as_ref()
            .and_then(|result| display_text(result, &["response", "text", "message"]))
            .or_else(|| payload.and_then(Value::as_str).filter(|s| !s.is_empty()).map(ToString::to_string))
            .or_else(|| display_text(body, &["message"]))
            .unwrap_or_else(|| NO_RESPONSE.to_string());

        let insights = result
            .as_ref()
            .and_then(|result| result.get("insights"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let recommendation = result
            .as_ref()
            .and_then(|result| result.get("recommendation"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);

        Self {
            response,
            insights,
            recommendation,
        }
    }
}

/// First present, non-empty field among `keys`; non-string values are JSON-encoded.
fn display_text(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    user_id: &'a str,
    agent_id: &'a str,
    session_id: &'a str,
    message: &'a str,
}

/// HTTP client for the agent call.
#[derive(Clone)]
pub struct AgentClient {
    endpoint: Url,
    api_key: String,
    user_id: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl AgentClient {
    pub fn new(
        endpoint: impl AsRef<str>,
        api_key: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint.as_ref())?,
            api_key: api_key.into(),
            user_id: user_id.into(),
            http: reqwest::Client::new(),
        })
    }

    /// Send `message` to `agent_id` within `session_id`.
    pub async fn chat(&self, message: &str, agent_id: &str, session_id: &str) -> Result<AgentReply> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .json(&AgentRequest {
                user_id: &self.user_id,
                agent_id,
                session_id,
                message,
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

        let body: Value = response.json().await?;
        Ok(AgentReply::from_value(&body))
    }
}

//! Agent platform event model.
//!
//! The remote platform pushes loosely-typed JSON status messages over the
//! real-time feed. This module turns them into [`AgentEvent`] values without
//! trusting the payload: fields that are missing or carry the wrong JSON type
//! are treated as absent, and unknown fields are ignored.
//!
//! # Discriminators
//!
//! - [`EventKind`]: the `event_type` field, with the kinds the dashboard
//!   reacts to spelled out and everything else kept verbatim.
//! - [`EventStatus`]: the `status` field, matched exactly.
//!
//! # Example
//!
//! ```rust
//! use pulse_dashboard::events::{AgentEvent, EventKind, EventStatus};
//!
//! let event: AgentEvent = serde_json::from_str(
//!     r#"{"event_type":"llm_generation","status":"completed","feature":"chat"}"#,
//! )
//! .unwrap();
//! assert_eq!(event.event_type, EventKind::LlmGeneration);
//! assert_eq!(event.status, Some(EventStatus::Completed));
//! assert!(event.completes_generation());
//! ```

pub mod classify;

pub use classify::{is_thinking_event, thinking_content};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Kind of event, taken from the `event_type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Manager agent reasoning log (`thinking_log`).
    ThinkingLog,
    /// Explicit thinking event (`thinking`).
    Thinking,
    /// Manager agent thought (`manager_thought`).
    ManagerThought,
    /// Sub-agent reasoning (`agent_reasoning`).
    AgentReasoning,
    /// Tool selection / invocation (`tool_calling`).
    ToolCalling,
    /// One iteration of a tool loop (`tool_calling_iteration`).
    ToolCallingIteration,
    /// Model generation lifecycle (`llm_generation`).
    LlmGeneration,
    /// Any other discriminator, kept verbatim. Empty when the field is absent.
    Other(String),
}

impl EventKind {
    /// Map a wire discriminator to a kind. Matching is exact.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "thinking_log" => Self::ThinkingLog,
            "thinking" => Self::Thinking,
            "manager_thought" => Self::ManagerThought,
            "agent_reasoning" => Self::AgentReasoning,
            "tool_calling" => Self::ToolCalling,
            "tool_calling_iteration" => Self::ToolCallingIteration,
            "llm_generation" => Self::LlmGeneration,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire spelling of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ThinkingLog => "thinking_log",
            Self::Thinking => "thinking",
            Self::ManagerThought => "manager_thought",
            Self::AgentReasoning => "agent_reasoning",
            Self::ToolCalling => "tool_calling",
            Self::ToolCallingIteration => "tool_calling_iteration",
            Self::LlmGeneration => "llm_generation",
            Self::Other(raw) => raw,
        }
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Lifecycle status reported by an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventStatus {
    InProgress,
    Completed,
    Failed,
    Success,
    /// Unrecognised status, kept verbatim.
    Other(String),
}

impl EventStatus {
    /// Parse a wire status. Matching is exact; `COMPLETED` stays [`EventStatus::Other`].
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "success" => Self::Success,
            _ => Self::Other(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Success => "success",
            Self::Other(raw) => raw,
        }
    }
}

impl Serialize for EventStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A single status message received from the agent platform.
///
/// Only `event_type` is always present (it falls back to an empty
/// [`EventKind::Other`]); every other field is optional. Diagnostic fields
/// are carried through for display but never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct AgentEvent {
    /// Subsystem that emitted the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Event discriminator.
    pub event_type: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    /// Log level as sent (`INFO`, `debug`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Reasoning payload, present on manager thinking events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// ISO-8601 timestamp as sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Display key; not guaranteed unique.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,

    // ─────────────────────────────────────────────────────────────────────
    // Diagnostics (passed through)
    // ─────────────────────────────────────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_exists: Option<bool>,
}

/// Returned when a feed frame is valid JSON but not an object.
#[derive(Debug, thiserror::Error)]
#[error("agent event must be a JSON object, got {0}")]
pub struct NotAnObject(&'static str);

impl TryFrom<Value> for AgentEvent {
    type Error = NotAnObject;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => return Err(NotAnObject("null")),
            Value::Bool(_) => return Err(NotAnObject("a boolean")),
            Value::Number(_) => return Err(NotAnObject("a number")),
            Value::String(_) => return Err(NotAnObject("a string")),
            Value::Array(_) => return Err(NotAnObject("an array")),
        };

        Ok(Self {
            feature: text(&obj, &["feature"]),
            event_type: text(&obj, &["event_type", "eventType"])
                .map(|raw| EventKind::from_wire(&raw))
                .unwrap_or_default(),
            status: text(&obj, &["status"]).map(|raw| EventStatus::from_wire(&raw)),
            level: text(&obj, &["level"]),
            message: text(&obj, &["message"]),
            thinking: text(&obj, &["thinking"]),
            timestamp: text(&obj, &["timestamp"]),
            agent_id: text(&obj, &["agent_id", "agentId"]),
            agent_name: text(&obj, &["agent_name", "agentName"]),
            tool_name: text(&obj, &["tool_name", "toolName"]),
            log_id: text(&obj, &["log_id", "logId"]),
            run_id: text(&obj, &["run_id", "runId"]),
            trace_id: text(&obj, &["trace_id", "traceId"]),
            session_id: text(&obj, &["session_id", "sessionId"]),
            user_id: text(&obj, &["user_id", "userId"]),
            model: text(&obj, &["model"]),
            provider: text(&obj, &["provider"]),
            context_type: text(&obj, &["context_type", "contextType"]),
            iteration: integer(&obj, &["iteration"]),
            message_count: integer(&obj, &["message_count", "messageCount"]),
            summary_length: integer(&obj, &["summary_length", "summaryLength"]),
            summary_exists: obj
                .get("summary_exists")
                .or_else(|| obj.get("summaryExists"))
                .and_then(Value::as_bool),
        })
    }
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    lookup(obj, keys)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn integer(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    lookup(obj, keys).and_then(Value::as_i64)
}

/// Colour family used to render an event in the activity feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTone {
    Completed,
    Failed,
    Thinking,
    Info,
}

/// Icon family used to render an event in the activity feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventGlyph {
    Thinking,
    Generation,
    Tool,
    Generic,
}

impl AgentEvent {
    /// Parse one feed frame. Returns `None` for anything that is not a JSON object.
    #[must_use]
    pub fn parse(frame: &str) -> Option<Self> {
        serde_json::from_str(frame).ok()
    }

    /// Whether this event marks the end of the model generation for a request.
    #[must_use]
    pub fn completes_generation(&self) -> bool {
        self.status == Some(EventStatus::Completed) && self.event_type == EventKind::LlmGeneration
    }

    /// Colour family for display; status wins over kind.
    #[must_use]
    pub fn tone(&self) -> EventTone {
        match (&self.status, &self.event_type) {
            (Some(EventStatus::Completed), _) => EventTone::Completed,
            (Some(EventStatus::Failed), _) => EventTone::Failed,
            (_, EventKind::Thinking) => EventTone::Thinking,
            _ => EventTone::Info,
        }
    }

    /// Icon family for display.
    #[must_use]
    pub fn glyph(&self) -> EventGlyph {
        let thinking_feature = self
            .feature
            .as_deref()
            .is_some_and(|feature| feature.contains("thinking"));
        match &self.event_type {
            EventKind::Thinking => EventGlyph::Thinking,
            _ if thinking_feature => EventGlyph::Thinking,
            EventKind::LlmGeneration => EventGlyph::Generation,
            EventKind::ToolCalling => EventGlyph::Tool,
            _ => EventGlyph::Generic,
        }
    }
}

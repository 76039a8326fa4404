//! Live agent activity: rolling state and the stream client that feeds it.
//!
//! # Architecture
//!
//! - [`ActivityState`]: display-ready snapshot with bounded event buffers
//! - [`ReconnectPolicy`]: exponential backoff for dropped feed connections
//! - [`ActivityStream`]: owns one feed connection per session and publishes
//!   [`ActivityState`] snapshots through a `tokio::sync::watch` channel
//!
//! The limits below are the defaults; [`StreamSettings`] carries the values a
//! particular stream uses.

pub mod backoff;
pub mod stream;

pub use backoff::ReconnectPolicy;
pub use stream::ActivityStream;

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::events::{AgentEvent, EventGlyph, EventTone, is_thinking_event, thinking_content};

/// Most recent events kept in [`ActivityState::events`].
pub const MAX_EVENTS: usize = 100;

/// Most recent thinking events kept in [`ActivityState::thinking_events`].
pub const MAX_THINKING_EVENTS: usize = 20;

/// Reconnects allowed after consecutive drops before the stream gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay between the connect precondition becoming true and the first attempt.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// First reconnect delay (milliseconds); doubles per attempt.
pub const RECONNECT_BASE_DELAY_MS: u64 = 1000;

/// Upper bound on any reconnect delay (milliseconds).
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// A raw `thinking` field longer than this always becomes the last thinking message.
const RAW_THINKING_MIN_CHARS: usize = 5;

/// Capacity of the rolling buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub max_events: usize,
    pub max_thinking_events: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_events: MAX_EVENTS,
            max_thinking_events: MAX_THINKING_EVENTS,
        }
    }
}

/// Tunables for an [`ActivityStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub limits: BufferLimits,
    pub reconnect: ReconnectPolicy,
    pub settle_delay: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            limits: BufferLimits::default(),
            reconnect: ReconnectPolicy::default(),
            settle_delay: SETTLE_DELAY,
        }
    }
}

/// Snapshot of agent activity for one UI session.
///
/// Serialized in camelCase for the browser. Each buffered event also carries
/// its display `tone` and `glyph`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityState {
    /// True only while the feed connection is open.
    pub is_connected: bool,
    /// Most recent events in arrival order.
    #[serde(serialize_with = "serialize_rendered")]
    pub events: VecDeque<AgentEvent>,
    /// Most recent thinking-classified events in arrival order.
    #[serde(serialize_with = "serialize_rendered")]
    pub thinking_events: VecDeque<AgentEvent>,
    pub last_thinking_message: Option<String>,
    pub active_agent_id: Option<String>,
    pub active_agent_name: Option<String>,
    /// Caller-driven; cleared automatically when generation completes.
    pub is_processing: bool,
}

/// Wire form of a buffered event: the event fields plus display hints.
#[derive(Serialize)]
struct RenderedEvent<'a> {
    #[serde(flatten)]
    event: &'a AgentEvent,
    tone: EventTone,
    glyph: EventGlyph,
}

fn serialize_rendered<S: Serializer>(
    events: &VecDeque<AgentEvent>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(events.iter().map(|event| RenderedEvent {
        event,
        tone: event.tone(),
        glyph: event.glyph(),
    }))
}

impl ActivityState {
    /// Fold one inbound event into the state.
    ///
    /// Returns `true` when the event signals that generation completed; the
    /// caller is responsible for stopping processing in that case.
    pub fn record(&mut self, event: AgentEvent, limits: BufferLimits) -> bool {
        if let Some(id) = event.agent_id.as_deref().filter(|id| !id.is_empty()) {
            self.active_agent_id = Some(id.to_string());
        }
        if let Some(name) = event.agent_name.as_deref().filter(|name| !name.is_empty()) {
            self.active_agent_name = Some(name.to_string());
        }

        if is_thinking_event(&event) {
            if let Some(content) = thinking_content(&event) {
                self.last_thinking_message = Some(content.to_string());
            }
            push_bounded(
                &mut self.thinking_events,
                event.clone(),
                limits.max_thinking_events,
            );
        }

        // Independent of classification; last write wins.
        if let Some(thinking) = event
            .thinking
            .as_deref()
            .filter(|t| t.chars().count() > RAW_THINKING_MIN_CHARS)
        {
            self.last_thinking_message = Some(thinking.to_string());
        }

        let completed = event.completes_generation();
        push_bounded(&mut self.events, event, limits.max_events);
        completed
    }

    /// Mark processing as finished and forget the active agent.
    pub fn stop_processing(&mut self) {
        self.is_processing = false;
        self.clear_active_agent();
    }

    pub fn clear_active_agent(&mut self) {
        self.active_agent_id = None;
        self.active_agent_name = None;
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> AgentEvent {
        AgentEvent::parse(&value.to_string()).unwrap()
    }

    #[test]
    fn test_events_are_capped_fifo() {
        let mut state = ActivityState::default();
        for i in 0..250 {
            state.record(
                event(json!({"event_type": "status", "log_id": i.to_string()})),
                BufferLimits::default(),
            );
            assert!(state.events.len() <= MAX_EVENTS);
        }
        assert_eq!(state.events.len(), MAX_EVENTS);
        assert_eq!(state.events.front().unwrap().log_id.as_deref(), Some("150"));
        assert_eq!(state.events.back().unwrap().log_id.as_deref(), Some("249"));
    }

    #[test]
    fn test_thinking_events_are_the_classified_suffix() {
        let mut state = ActivityState::default();
        for i in 0..120 {
            let value = if i % 3 == 0 {
                json!({"event_type": "thinking_log", "log_id": i.to_string()})
            } else {
                json!({"event_type": "status", "log_id": i.to_string()})
            };
            state.record(event(value), BufferLimits::default());
            assert!(state.thinking_events.len() <= MAX_THINKING_EVENTS);
        }

        let expected: Vec<_> = state
            .events
            .iter()
            .filter(|e| is_thinking_event(e))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .take(MAX_THINKING_EVENTS)
            .rev()
            .cloned()
            .collect();
        assert_eq!(state.thinking_events.iter().cloned().collect::<Vec<_>>(), expected);
        assert_eq!(state.thinking_events.back().unwrap().log_id.as_deref(), Some("117"));
    }

    #[test]
    fn test_thinking_field_sets_last_message() {
        let mut state = ActivityState::default();
        state.record(
            event(json!({"event_type": "status", "thinking": "Considering three options"})),
            BufferLimits::default(),
        );
        assert_eq!(
            state.last_thinking_message.as_deref(),
            Some("Considering three options")
        );
        assert_eq!(state.thinking_events.len(), 1);
    }

    #[test]
    fn test_message_used_when_thinking_absent() {
        let mut state = ActivityState::default();
        state.record(
            event(json!({"event_type": "tool_calling", "message": "Calling search tool"})),
            BufferLimits::default(),
        );
        assert_eq!(state.last_thinking_message.as_deref(), Some("Calling search tool"));

        state.record(
            event(json!({"event_type": "tool_calling", "message": "ok"})),
            BufferLimits::default(),
        );
        assert_eq!(state.thinking_events.len(), 1);
        assert_eq!(state.last_thinking_message.as_deref(), Some("Calling search tool"));
    }

    #[test]
    fn test_raw_thinking_rule_applies_without_classification_text() {
        // Untrimmed length counts for the raw rule: "  abc  " is 7 chars but
        // only 3 after trimming, so it is not classified as thinking.
        let mut state = ActivityState::default();
        state.record(
            event(json!({"event_type": "status", "thinking": "  abc  "})),
            BufferLimits::default(),
        );
        assert!(state.thinking_events.is_empty());
        assert_eq!(state.last_thinking_message.as_deref(), Some("  abc  "));
    }

    #[test]
    fn test_explicit_kind_without_text_keeps_previous_message() {
        let mut state = ActivityState::default();
        state.last_thinking_message = Some("earlier".to_string());
        state.record(event(json!({"event_type": "manager_thought"})), BufferLimits::default());
        assert_eq!(state.thinking_events.len(), 1);
        assert_eq!(state.last_thinking_message.as_deref(), Some("earlier"));
    }

    #[test]
    fn test_active_agent_tracks_last_non_empty() {
        let mut state = ActivityState::default();
        state.record(
            event(json!({"event_type": "status", "agent_id": "a1", "agent_name": "Analyst"})),
            BufferLimits::default(),
        );
        state.record(
            event(json!({"event_type": "status", "agent_id": "", "agent_name": "Writer"})),
            BufferLimits::default(),
        );
        assert_eq!(state.active_agent_id.as_deref(), Some("a1"));
        assert_eq!(state.active_agent_name.as_deref(), Some("Writer"));

        state.stop_processing();
        assert!(state.active_agent_id.is_none());
        assert!(state.active_agent_name.is_none());
    }

    #[test]
    fn test_record_reports_completion() {
        let mut state = ActivityState::default();
        assert!(!state.record(
            event(json!({"event_type": "llm_generation", "status": "in_progress"})),
            BufferLimits::default(),
        ));
        assert!(state.record(
            event(json!({"event_type": "llm_generation", "status": "completed"})),
            BufferLimits::default(),
        ));
        assert_eq!(state.events.len(), 2);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut state = ActivityState::default();
        let limits = BufferLimits {
            max_events: 0,
            max_thinking_events: 0,
        };
        state.record(event(json!({"event_type": "thinking"})), limits);
        assert!(state.events.is_empty());
        assert!(state.thinking_events.is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let state = ActivityState {
            is_processing: true,
            ..ActivityState::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isProcessing"], true);
        assert_eq!(json["isConnected"], false);
        assert!(json["lastThinkingMessage"].is_null());
        assert!(json["thinkingEvents"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_serialized_events_carry_display_hints() {
        let mut state = ActivityState::default();
        state.record(
            event(json!({"event_type": "llm_generation", "status": "completed", "agent_id": "a-1"})),
            BufferLimits::default(),
        );
        state.record(
            event(json!({"event_type": "thinking", "thinking": "Comparing regions"})),
            BufferLimits::default(),
        );

        let json = serde_json::to_value(&state).unwrap();
        let events = json["events"].as_array().unwrap();
        assert_eq!(events[0]["event_type"], "llm_generation");
        assert_eq!(events[0]["agent_id"], "a-1");
        assert_eq!(events[0]["tone"], "completed");
        assert_eq!(events[0]["glyph"], "generation");
        assert_eq!(events[1]["tone"], "thinking");
        assert_eq!(events[1]["glyph"], "thinking");

        let thinking = json["thinkingEvents"].as_array().unwrap();
        assert_eq!(thinking.len(), 1);
        assert_eq!(thinking[0]["thinking"], "Comparing regions");
        assert_eq!(thinking[0]["glyph"], "thinking");
    }
}

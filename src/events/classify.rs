//! Thinking-event heuristics.
//!
//! A "thinking" event is one that appears to carry the agent's intermediate
//! reasoning rather than routine telemetry. The platform does not flag these
//! explicitly, so the predicate is a set of field heuristics; any one match
//! is enough.

use super::{AgentEvent, EventKind};

/// Text must be longer than this (in characters, after trimming) to count as substantive.
const MIN_SUBSTANTIVE_CHARS: usize = 3;

/// Feature label that marks tool-calling events regardless of `event_type`.
const TOOL_CALLING_FEATURE: &str = "tool_calling";

/// Context type attached to tool results.
const TOOL_RESULT_CONTEXT: &str = "tool_result";

fn is_substantive(text: Option<&str>) -> bool {
    text.is_some_and(|t| t.trim().chars().count() > MIN_SUBSTANTIVE_CHARS)
}

/// Returns `true` if the event should appear in the thinking feed.
#[must_use]
pub fn is_thinking_event(event: &AgentEvent) -> bool {
    if is_substantive(event.thinking.as_deref()) {
        return true;
    }

    let substantive_message = is_substantive(event.message.as_deref());

    match &event.event_type {
        EventKind::ThinkingLog
        | EventKind::Thinking
        | EventKind::ManagerThought
        | EventKind::AgentReasoning => return true,
        EventKind::ToolCalling | EventKind::ToolCallingIteration if substantive_message => {
            return true;
        }
        _ => {}
    }

    if event.feature.as_deref() == Some(TOOL_CALLING_FEATURE) && substantive_message {
        return true;
    }

    if event.context_type.as_deref() == Some(TOOL_RESULT_CONTEXT) && substantive_message {
        return true;
    }

    event
        .feature
        .as_deref()
        .is_some_and(|feature| feature.to_lowercase().contains("thinking"))
}

/// Text to show for a thinking event: `thinking` if non-empty, else `message` if non-empty.
#[must_use]
pub fn thinking_content(event: &AgentEvent) -> Option<&str> {
    event
        .thinking
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| event.message.as_deref().filter(|m| !m.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> AgentEvent {
        AgentEvent::parse(json).unwrap()
    }

    #[test]
    fn test_thinking_field() {
        assert!(is_thinking_event(&event(
            r#"{"event_type":"status","thinking":"Considering three options"}"#
        )));
        // Whitespace is trimmed before the length check.
        assert!(!is_thinking_event(&event(
            r#"{"event_type":"status","thinking":"  ok   "}"#
        )));
        assert!(!is_thinking_event(&event(r#"{"event_type":"status","thinking":"abc"}"#)));
        assert!(is_thinking_event(&event(r#"{"event_type":"status","thinking":"abcd"}"#)));
    }

    #[test]
    fn test_explicit_kinds_match_without_text() {
        for kind in ["thinking_log", "thinking", "manager_thought", "agent_reasoning"] {
            let e = event(&format!(r#"{{"event_type":"{kind}"}}"#));
            assert!(is_thinking_event(&e), "{kind} should classify as thinking");
        }
    }

    #[test]
    fn test_tool_calling_needs_substantive_message() {
        assert!(!is_thinking_event(&event(
            r#"{"event_type":"tool_calling","message":"ok"}"#
        )));
        assert!(is_thinking_event(&event(
            r#"{"event_type":"tool_calling","message":"Calling search tool"}"#
        )));
        assert!(is_thinking_event(&event(
            r#"{"event_type":"tool_calling_iteration","message":"Iteration two"}"#
        )));
        assert!(!is_thinking_event(&event(r#"{"event_type":"tool_calling"}"#)));
    }

    #[test]
    fn test_tool_calling_feature() {
        assert!(is_thinking_event(&event(
            r#"{"event_type":"status","feature":"tool_calling","message":"Picked the CRM agent"}"#
        )));
        assert!(!is_thinking_event(&event(
            r#"{"event_type":"status","feature":"tool_calling","message":"ok"}"#
        )));
    }

    #[test]
    fn test_tool_result_context() {
        assert!(is_thinking_event(&event(
            r#"{"event_type":"status","context_type":"tool_result","message":"Found 3 rows"}"#
        )));
        assert!(!is_thinking_event(&event(
            r#"{"event_type":"status","context_type":"tool_result","message":" no "}"#
        )));
    }

    #[test]
    fn test_feature_contains_thinking_case_insensitive() {
        assert!(is_thinking_event(&event(
            r#"{"event_type":"status","feature":"Manager_THINKING_step"}"#
        )));
    }

    #[test]
    fn test_routine_events_do_not_match() {
        assert!(!is_thinking_event(&event(
            r#"{"event_type":"llm_generation","status":"in_progress","message":"Generating response"}"#
        )));
        assert!(!is_thinking_event(&event(r#"{"event_type":"memory_update"}"#)));
    }

    #[test]
    fn test_event_type_match_is_exact() {
        assert!(!is_thinking_event(&event(r#"{"event_type":"THINKING_LOG"}"#)));
    }

    #[test]
    fn test_thinking_content_prefers_thinking() {
        let e = event(r#"{"event_type":"thinking","thinking":"deep thought","message":"msg"}"#);
        assert_eq!(thinking_content(&e), Some("deep thought"));

        let e = event(r#"{"event_type":"thinking","thinking":"","message":"msg"}"#);
        assert_eq!(thinking_content(&e), Some("msg"));

        let e = event(r#"{"event_type":"thinking","message":""}"#);
        assert_eq!(thinking_content(&e), None);
    }
}

//! Normalized streaming events.
//!
//! `StreamEvent` is the unit emitted to relay callers, over SSE or buffered.
//! Events are ordered and consumed exactly once per connection; there is no
//! replay buffer — authoritative history lives in the transcript store.

use serde::{Deserialize, Serialize};
use threadline_core::message::Message;

/// Events emitted during one relay invocation.
///
/// - `content_delta`     — partial assistant text, forwarded as it arrives
/// - `tool_result_delta` — partial output of a streaming tool
/// - `tool_messages`     — a batch of fully-formed tool messages, emitted
///                         after they are durably appended
/// - `agent_done`        — terminal marker for a successful turn
/// - `error`             — terminal marker for a failed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial assistant text for a thread.
    ContentDelta { thread_id: String, delta: String },

    /// Partial output from a tool whose execution itself streams.
    ToolResultDelta {
        tool_call_id: String,
        tool_name: String,
        delta: String,
    },

    /// Fully-formed tool messages to splice into the transcript view.
    ToolMessages { messages: Vec<Message> },

    /// The turn completed. `truncated` is set when the iteration budget was
    /// exhausted rather than the model signalling completion.
    AgentDone { thread_id: String, truncated: bool },

    /// The turn failed. Always the last event on its stream.
    Error { message: String },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolResultDelta { .. } => "tool_result_delta",
            Self::ToolMessages { .. } => "tool_messages",
            Self::AgentDone { .. } => "agent_done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AgentDone { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta_serialization() {
        let event = StreamEvent::ContentDelta {
            thread_id: "t-1".into(),
            delta: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"content_delta""#));
        assert!(json.contains(r#""delta":"Hello""#));
    }

    #[test]
    fn tool_messages_carry_full_messages() {
        let event = StreamEvent::ToolMessages {
            messages: vec![Message::tool_result("call_1", "get_weather", "Sunny")],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_messages""#));
        assert!(json.contains("call_1"));
    }

    #[test]
    fn terminal_classification() {
        assert!(StreamEvent::AgentDone {
            thread_id: "t".into(),
            truncated: false
        }
        .is_terminal());
        assert!(StreamEvent::Error {
            message: "boom".into()
        }
        .is_terminal());
        assert!(!StreamEvent::ContentDelta {
            thread_id: "t".into(),
            delta: "x".into()
        }
        .is_terminal());
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            StreamEvent::ToolResultDelta {
                tool_call_id: "c".into(),
                tool_name: "n".into(),
                delta: "d".into()
            }
            .event_type(),
            "tool_result_delta"
        );
        assert_eq!(
            StreamEvent::AgentDone {
                thread_id: "t".into(),
                truncated: true
            }
            .event_type(),
            "agent_done"
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"agent_done","thread_id":"t-1","truncated":false}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        match event {
            StreamEvent::AgentDone {
                thread_id,
                truncated,
            } => {
                assert_eq!(thread_id, "t-1");
                assert!(!truncated);
            }
            _ => panic!("Wrong variant"),
        }
    }
}

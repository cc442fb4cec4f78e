//! Transcript sanitation for provider replay.
//!
//! OpenAI-style APIs require that every `tool` message answer a tool call on
//! the immediately preceding assistant message. A turn that failed mid-way
//! can leave a transcript whose tail violates that (e.g., an assistant
//! message with calls but no results). Filtering orphans keeps stored
//! history replayable without rewriting it.

use std::collections::HashSet;
use threadline_core::message::{Message, Role};
use tracing::warn;

/// Drop tool messages that do not answer a call from the preceding
/// assistant message. Order is otherwise preserved.
pub fn sanitize_for_provider(messages: &[Message]) -> Vec<Message> {
    let mut sanitized = Vec::with_capacity(messages.len());
    let mut open_call_ids: HashSet<String> = HashSet::new();

    for msg in messages {
        match msg.role {
            Role::Assistant if !msg.tool_calls.is_empty() => {
                open_call_ids = msg.tool_calls.iter().map(|tc| tc.id.clone()).collect();
                sanitized.push(msg.clone());
            }
            Role::Tool => {
                let answered = msg
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| open_call_ids.remove(id));
                if answered {
                    sanitized.push(msg.clone());
                } else {
                    warn!(
                        tool_call_id = ?msg.tool_call_id,
                        name = ?msg.name,
                        "Skipping orphan tool message"
                    );
                }
            }
            _ => {
                open_call_ids.clear();
                sanitized.push(msg.clone());
            }
        }
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::message::ToolCall;

    fn assistant_with_call(call_id: &str) -> Message {
        Message::assistant_with_tools(
            None,
            vec![ToolCall {
                id: call_id.into(),
                name: "get_weather".into(),
                arguments: "{}".into(),
            }],
        )
    }

    #[test]
    fn answered_tool_messages_are_kept() {
        let messages = vec![
            Message::user("weather?"),
            assistant_with_call("call_1"),
            Message::tool_result("call_1", "get_weather", "Sunny"),
        ];
        let sanitized = sanitize_for_provider(&messages);
        assert_eq!(sanitized.len(), 3);
    }

    #[test]
    fn orphan_tool_messages_are_dropped() {
        let messages = vec![
            Message::user("weather?"),
            Message::tool_result("call_ghost", "get_weather", "Sunny"),
        ];
        let sanitized = sanitize_for_provider(&messages);
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized[0].role, Role::User);
    }

    #[test]
    fn duplicate_answers_keep_only_first() {
        let messages = vec![
            assistant_with_call("call_1"),
            Message::tool_result("call_1", "get_weather", "Sunny"),
            Message::tool_result("call_1", "get_weather", "Sunny again"),
        ];
        let sanitized = sanitize_for_provider(&messages);
        assert_eq!(sanitized.len(), 2);
    }

    #[test]
    fn intervening_message_closes_the_call_window() {
        let messages = vec![
            assistant_with_call("call_1"),
            Message::user("never mind"),
            Message::tool_result("call_1", "get_weather", "too late"),
        ];
        let sanitized = sanitize_for_provider(&messages);
        assert_eq!(sanitized.len(), 2);
        assert!(sanitized.iter().all(|m| m.role != Role::Tool));
    }

    #[test]
    fn plain_conversation_is_untouched() {
        let messages = vec![
            Message::system("be helpful"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let sanitized = sanitize_for_provider(&messages);
        assert_eq!(sanitized.len(), 3);
    }
}

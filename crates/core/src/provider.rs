//! Provider trait — the abstraction over upstream LLM backends.
//!
//! A Provider knows how to send an ordered message list to a model and get a
//! response back, either as a complete message or as an ordered stream of
//! delta fragments (content pieces and partially-built tool calls).
//!
//! Reconstructing complete messages from fragments is deliberately NOT the
//! provider's job — that belongs to the delta reconstructor, which scopes
//! accumulation state to one in-flight message.

use crate::error::ProviderError;
use crate::message::{Message, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The full ordered transcript to replay
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated assistant message
    pub message: Message,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Token usage statistics
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why a streamed completion ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Ordinary completion — the model is done talking.
    Stop,
    /// The model requested tool invocations.
    ToolCalls,
    /// Anything else the provider reports (length, content_filter, ...).
    Other(String),
}

impl FinishReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "stop" => Self::Stop,
            "tool_calls" => Self::ToolCalls,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One incremental piece of a tool call, keyed by a positional index local
/// to the in-flight message.
///
/// `id` and `name` typically arrive only on the first fragment for a given
/// index; `arguments` arrives as partial JSON tokens that must be
/// reassembled by concatenation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A single delta fragment in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaFragment {
    /// The provider's per-response identifier. A change of identifier marks
    /// a boundary between two completions within one stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Partial content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Partial tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragment>,

    /// Present on the terminal fragment of a completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Usage info (typically only on the final fragment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The core Provider trait.
///
/// The agent loop calls `complete()` or `stream()` without knowing which
/// backend is being used — pure polymorphism.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Send a request and get an ordered stream of delta fragments.
    ///
    /// Default implementation calls `complete()` and replays the result as a
    /// single terminal fragment, so non-streaming backends still work with
    /// the streaming relay.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<DeltaFragment, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(DeltaFragment {
                id: Some(response.message.id.clone()),
                content: response.message.content.clone(),
                tool_calls: to_fragments(&response.message.tool_calls),
                finish_reason: Some(if response.message.tool_calls.is_empty() {
                    FinishReason::Stop
                } else {
                    FinishReason::ToolCalls
                }),
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}

/// Replay completed tool calls as if they had streamed, one fragment each.
fn to_fragments(calls: &[ToolCall]) -> Vec<ToolCallFragment> {
    calls
        .iter()
        .enumerate()
        .map(|(i, tc)| ToolCallFragment {
            index: i as u32,
            id: Some(tc.id.clone()),
            name: Some(tc.name.clone()),
            arguments: Some(tc.arguments.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                message: Message::assistant("hi there"),
                model: "fixed-model".into(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let provider = FixedProvider;
        let request = ProviderRequest {
            model: "fixed-model".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![],
        };

        let mut rx = provider.stream(request).await.unwrap();
        let fragment = rx.recv().await.unwrap().unwrap();
        assert_eq!(fragment.content.as_deref(), Some("hi there"));
        assert_eq!(fragment.finish_reason, Some(FinishReason::Stop));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn default_stream_reports_tool_calls() {
        struct ToolProvider;

        #[async_trait]
        impl Provider for ToolProvider {
            fn name(&self) -> &str {
                "tools"
            }

            async fn complete(
                &self,
                _request: ProviderRequest,
            ) -> std::result::Result<CompletionResponse, ProviderError> {
                Ok(CompletionResponse {
                    message: Message::assistant_with_tools(
                        None,
                        vec![ToolCall {
                            id: "call_1".into(),
                            name: "idle".into(),
                            arguments: "{}".into(),
                        }],
                    ),
                    model: "tools-model".into(),
                    usage: None,
                })
            }
        }

        let mut rx = ToolProvider
            .stream(ProviderRequest {
                model: "tools-model".into(),
                messages: vec![],
                temperature: 0.0,
                max_tokens: None,
                tools: vec![],
            })
            .await
            .unwrap();

        let fragment = rx.recv().await.unwrap().unwrap();
        assert_eq!(fragment.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(fragment.tool_calls.len(), 1);
        assert_eq!(fragment.tool_calls[0].name.as_deref(), Some("idle"));
    }

    #[test]
    fn finish_reason_parsing() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(
            FinishReason::parse("length"),
            FinishReason::Other("length".into())
        );
    }

    #[test]
    fn fixed_provider_message_role() {
        let msg = Message::assistant("x");
        assert_eq!(msg.role, Role::Assistant);
    }
}

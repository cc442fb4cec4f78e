//! Tool dispatch — executing the model's tool calls.
//!
//! The dispatcher turns every completed [`ToolCall`] into a tool-role
//! [`Message`], no matter what happened: unknown names, bad arguments,
//! execution failures, and timeouts all become error-content messages
//! rather than crossing the loop boundary as errors. A single bad tool call
//! must never abort the whole turn.
//!
//! The distinguished `idle` call is a control-flow signal disguised as a
//! tool: it is parsed into a tagged variant at this boundary, produces no
//! external side effect, and marks the loop for termination.

use crate::stream_event::StreamEvent;
use std::sync::Arc;
use std::time::Duration;
use threadline_core::error::ToolError;
use threadline_core::message::{Message, ToolCall};
use threadline_core::provider::ToolDefinition;
use threadline_core::tool::{Tool, ToolRegistry, ToolResult};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The tool name that terminates the agent loop.
pub const IDLE_TOOL_NAME: &str = "idle";

/// A tool call parsed at the dispatcher boundary.
#[derive(Debug)]
pub enum ParsedCall {
    /// The distinguished termination signal.
    Idle { summary: String },
    /// An ordinary invocation of a registered tool.
    Invoke {
        name: String,
        arguments: serde_json::Value,
    },
}

impl ParsedCall {
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        let arguments: serde_json::Value = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| {
                ToolError::InvalidArguments(format!("{}: {e}", call.name))
            })?
        };

        if call.name == IDLE_TOOL_NAME {
            let summary = arguments["summary"].as_str().unwrap_or("").to_string();
            Ok(Self::Idle { summary })
        } else {
            Ok(Self::Invoke {
                name: call.name.clone(),
                arguments,
            })
        }
    }
}

/// The outcome of dispatching one tool call.
#[derive(Debug)]
pub struct Dispatch {
    /// The tool-role message to append to the transcript.
    pub message: Message,
    /// Whether this call was the idle signal.
    pub idle: bool,
    /// Whether the tool reported success.
    pub success: bool,
    /// Wall-clock execution time.
    pub duration_ms: u64,
}

/// Executes completed tool calls with a bounded per-call timeout.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    call_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    /// The definition of the built-in idle tool, advertised to the model
    /// alongside the registry's tools.
    pub fn idle_definition() -> ToolDefinition {
        ToolDefinition {
            name: IDLE_TOOL_NAME.into(),
            description: "REQUIRED: You MUST call this function after every response to signal \
                          you are done. Call it after responding to the user, after completing \
                          tasks, or after any message. Never end your turn without calling idle."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Optional brief summary of what was accomplished"
                    }
                },
                "required": []
            }),
        }
    }

    /// All tool definitions to send to the model: registry tools plus idle.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.registry.definitions();
        defs.push(Self::idle_definition());
        defs
    }

    /// Execute one tool call, forwarding streamed output on `events`.
    ///
    /// Never fails: every failure mode becomes an error-content message.
    pub async fn dispatch(&self, call: &ToolCall, events: &mpsc::Sender<StreamEvent>) -> Dispatch {
        let start = std::time::Instant::now();

        let parsed = match ParsedCall::parse(call) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Malformed tool arguments");
                return self.failure(call, format!("Error: {e}"), start);
            }
        };

        match parsed {
            ParsedCall::Idle { summary } => {
                debug!(summary = %summary, "Idle signal dispatched");
                let content =
                    serde_json::json!({ "status": "idle", "summary": summary }).to_string();
                Dispatch {
                    message: Message::tool_result(&call.id, &call.name, content),
                    idle: true,
                    success: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            ParsedCall::Invoke { name, arguments } => {
                let Some(tool) = self.registry.get(&name) else {
                    warn!(tool = %name, "Unknown tool requested");
                    let e = ToolError::NotFound(name);
                    return self.failure(call, format!("Error: {e}"), start);
                };

                let outcome = if tool.is_streaming() {
                    tokio::time::timeout(
                        self.call_timeout,
                        self.run_streaming(tool, call, arguments, events),
                    )
                    .await
                } else {
                    tokio::time::timeout(self.call_timeout, tool.execute(arguments)).await
                };

                match outcome {
                    Err(_) => {
                        let e = ToolError::Timeout {
                            tool_name: call.name.clone(),
                            timeout_secs: self.call_timeout.as_secs(),
                        };
                        warn!(tool = %call.name, "{e}");
                        self.failure(call, format!("Error: {e}"), start)
                    }
                    Ok(Err(e)) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        self.failure(call, format!("Error: {e}"), start)
                    }
                    Ok(Ok(result)) => {
                        let success = result.success;
                        let content = if success {
                            result.output
                        } else {
                            format!("Error: {}", result.output)
                        };
                        Dispatch {
                            message: Message::tool_result(&call.id, &call.name, content),
                            idle: false,
                            success,
                            duration_ms: start.elapsed().as_millis() as u64,
                        }
                    }
                }
            }
        }
    }

    /// Drive a streaming tool, forwarding each chunk as a
    /// `tool_result_delta` event while it runs.
    async fn run_streaming(
        &self,
        tool: &dyn Tool,
        call: &ToolCall,
        arguments: serde_json::Value,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<ToolResult, ToolError> {
        let (tx, mut rx) = mpsc::channel::<String>(16);
        let mut fut = Box::pin(tool.execute_streaming(arguments, tx));
        let mut result = None;

        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(delta) => {
                        let _ = events
                            .send(StreamEvent::ToolResultDelta {
                                tool_call_id: call.id.clone(),
                                tool_name: call.name.clone(),
                                delta,
                            })
                            .await;
                    }
                    // Sender gone: every produced chunk has been drained.
                    None => break,
                },
                res = &mut fut, if result.is_none() => {
                    result = Some(res);
                }
            }
        }

        match result {
            Some(res) => res,
            None => fut.await,
        }
    }

    fn failure(&self, call: &ToolCall, content: String, start: std::time::Instant) -> Dispatch {
        Dispatch {
            message: Message::tool_result(&call.id, &call.name, content),
            idle: false,
            success: false,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

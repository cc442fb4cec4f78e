//! Client-side event folding — the UI mirror of reconstruction.
//!
//! A second, independent implementation of the streaming protocol: a pure
//! function from (prior state, incoming event) to (new state, render
//! instructions). Front ends fold the relay's event stream through this to
//! build their display without re-implementing the protocol ad hoc, and it
//! is testable without any UI.

use crate::stream_event::StreamEvent;
use serde::{Deserialize, Serialize};
use threadline_core::message::Message;

/// An instruction for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderOp {
    /// Append text to the in-progress assistant reply.
    AppendText { text: String },

    /// Append partial output to a tool's result panel.
    AppendToolOutput {
        tool_call_id: String,
        tool_name: String,
        text: String,
    },

    /// Splice fully-formed messages into the displayed transcript.
    SpliceMessages { count: usize },

    /// The turn is over; close the reply.
    Finish { truncated: bool },

    /// Show a terminal error.
    ShowError { message: String },
}

/// Accumulated view of one relay invocation.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// The assistant reply assembled so far.
    pub reply: String,

    /// Messages spliced in by `tool_messages` events, in arrival order.
    pub spliced: Vec<Message>,

    /// Set once a terminal event arrived.
    pub finished: bool,

    /// Whether the turn was cut off by the iteration budget.
    pub truncated: bool,

    /// Terminal error, if the turn failed.
    pub error: Option<String>,
}

impl ViewState {
    /// Fold one event: returns the next state and the render instructions
    /// it implies. Events after a terminal event are ignored.
    pub fn apply(mut self, event: &StreamEvent) -> (ViewState, Vec<RenderOp>) {
        if self.finished {
            return (self, Vec::new());
        }

        let ops = match event {
            StreamEvent::ContentDelta { delta, .. } => {
                self.reply.push_str(delta);
                vec![RenderOp::AppendText {
                    text: delta.clone(),
                }]
            }
            StreamEvent::ToolResultDelta {
                tool_call_id,
                tool_name,
                delta,
            } => vec![RenderOp::AppendToolOutput {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                text: delta.clone(),
            }],
            StreamEvent::ToolMessages { messages } => {
                self.spliced.extend(messages.iter().cloned());
                vec![RenderOp::SpliceMessages {
                    count: messages.len(),
                }]
            }
            StreamEvent::AgentDone { truncated, .. } => {
                self.finished = true;
                self.truncated = *truncated;
                vec![RenderOp::Finish {
                    truncated: *truncated,
                }]
            }
            StreamEvent::Error { message } => {
                self.finished = true;
                self.error = Some(message.clone());
                vec![RenderOp::ShowError {
                    message: message.clone(),
                }]
            }
        };

        (self, ops)
    }
}

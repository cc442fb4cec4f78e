//! Delta reconstruction — folding provider fragments into whole messages.
//!
//! The reconstructor consumes an ordered sequence of heterogeneous delta
//! fragments and rebuilds complete assistant messages, emitting
//! `content_delta` events as a side channel so callers see tokens live.
//!
//! All accumulation state is scoped to ONE in-flight message and discarded
//! wholesale at every finalization boundary. Sharing tool-call accumulators
//! across completions is the classic cross-message leakage bug; the tests
//! below pin the reset behavior down explicitly.

use crate::stream_event::StreamEvent;
use std::collections::BTreeMap;
use threadline_core::message::{Message, ToolCall};
use threadline_core::provider::{DeltaFragment, FinishReason};

/// Accumulates one tool call's fragments at a single index.
///
/// `id` and `name`: first non-empty value wins and is then fixed.
/// `arguments`: fragments concatenate, never overwrite.
#[derive(Debug, Default)]
struct ToolCallDraft {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallDraft {
    fn freeze(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// The result of feeding one fragment to the reconstructor.
#[derive(Debug, Default)]
pub struct StepOutput {
    /// Events to forward to the caller, in order.
    pub events: Vec<StreamEvent>,
    /// Messages finalized by this fragment. Usually zero or one; a fragment
    /// that both crosses a response-id boundary and carries a finish reason
    /// finalizes two.
    pub finalized: Vec<Message>,
}

/// Rebuilds complete messages from an incremental fragment stream.
pub struct DeltaReconstructor {
    thread_id: String,
    /// The provider's identifier for the in-flight completion.
    current_id: Option<String>,
    content: String,
    /// Tool calls keyed by positional index. BTreeMap keeps index order and
    /// tolerates gaps (a missing index is simply an absent call).
    calls: BTreeMap<u32, ToolCallDraft>,
}

impl DeltaReconstructor {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            current_id: None,
            content: String::new(),
            calls: BTreeMap::new(),
        }
    }

    /// Feed one fragment; returns events to emit and any finalized messages.
    pub fn push(&mut self, fragment: DeltaFragment) -> StepOutput {
        let mut output = StepOutput::default();

        // A fragment tagged with a different response id than the in-flight
        // completion closes the prior message (if it accumulated anything)
        // and starts a fresh one.
        if let Some(id) = &fragment.id {
            match &self.current_id {
                Some(current) if current != id => {
                    if let Some(message) = self.take_in_flight() {
                        output.finalized.push(message);
                    }
                    self.reset();
                    self.current_id = Some(id.clone());
                }
                None => self.current_id = Some(id.clone()),
                _ => {}
            }
        }

        if let Some(content) = &fragment.content {
            if !content.is_empty() {
                self.content.push_str(content);
                output.events.push(StreamEvent::ContentDelta {
                    thread_id: self.thread_id.clone(),
                    delta: content.clone(),
                });
            }
        }

        for tc in &fragment.tool_calls {
            let draft = self.calls.entry(tc.index).or_default();
            if draft.id.is_empty() {
                if let Some(id) = tc.id.as_deref() {
                    draft.id.push_str(id);
                }
            }
            if draft.name.is_empty() {
                if let Some(name) = tc.name.as_deref() {
                    draft.name.push_str(name);
                }
            }
            if let Some(args) = tc.arguments.as_deref() {
                draft.arguments.push_str(args);
            }
        }

        if let Some(reason) = &fragment.finish_reason {
            let message = self.finalize(reason);
            self.reset();
            output.finalized.push(message);
        }

        output
    }

    /// Build the message for an explicit terminal signal.
    fn finalize(&self, reason: &FinishReason) -> Message {
        let content = if self.content.is_empty() {
            None
        } else {
            Some(self.content.clone())
        };

        let tool_calls = match reason {
            FinishReason::ToolCalls => self.calls.values().map(ToolCallDraft::freeze).collect(),
            _ => Vec::new(),
        };

        Message::assistant_with_tools(content, tool_calls)
    }

    /// Close the in-flight message at a response-id boundary.
    /// Returns `None` when nothing accumulated (nothing worth finalizing).
    fn take_in_flight(&self) -> Option<Message> {
        if self.content.is_empty() && self.calls.is_empty() {
            return None;
        }
        let content = if self.content.is_empty() {
            None
        } else {
            Some(self.content.clone())
        };
        let tool_calls = self.calls.values().map(ToolCallDraft::freeze).collect();
        Some(Message::assistant_with_tools(content, tool_calls))
    }

    /// Discard ALL accumulation state, including the response id.
    fn reset(&mut self) {
        self.current_id = None;
        self.content.clear();
        self.calls.clear();
    }
}

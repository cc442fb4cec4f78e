//! The agent loop controller — one relay invocation from start to terminal
//! event.
//!
//! Per turn: `Start → AwaitingProvider → HandlingToolCalls → AwaitingProvider
//! (repeat) → Done`, with `Failed` reachable from any state. Every append to
//! the transcript store happens before the corresponding event is emitted, so
//! a client that re-reads the store never sees less than it was streamed.

use crate::dispatcher::ToolDispatcher;
use crate::reconstructor::DeltaReconstructor;
use crate::sanitize::sanitize_for_provider;
use crate::stream_event::StreamEvent;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use threadline_core::error::{Error, ProviderError};
use threadline_core::event::{DomainEvent, EventBus};
use threadline_core::message::{Message, Role, ThreadId};
use threadline_core::provider::{Provider, ProviderRequest};
use threadline_core::store::TranscriptStore;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Default system prompt. The model must close every turn with `idle`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. IMPORTANT: You MUST always \
     call the 'idle' function when you are done responding. Even if you just want to say \
     something without using tools, you must still call 'idle' afterwards to signal completion. \
     Never end your turn without calling 'idle'.";

/// Per-thread turn locks.
///
/// Two concurrent turns on the same thread id are serialized so their
/// appends form contiguous blocks in the final transcript; turns on
/// different threads share nothing and proceed in parallel.
pub struct ThreadLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, thread_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for ThreadLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run overrides from the relay request.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// The agent loop that orchestrates provider calls and tool execution for
/// one thread turn, streaming normalized events as it goes.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    store: Arc<dyn TranscriptStore>,
    dispatcher: Arc<ToolDispatcher>,
    event_bus: Arc<EventBus>,
    locks: ThreadLocks,

    /// The model to use when the request doesn't name one
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Maximum provider/tool iterations per turn
    max_iterations: u32,

    /// Timeout for establishing a provider stream and for each fragment
    provider_timeout: Duration,

    /// System prompt injected into threads that don't carry one
    system_prompt: String,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn TranscriptStore>,
        dispatcher: Arc<ToolDispatcher>,
        model: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            store,
            dispatcher,
            event_bus,
            locks: ThreadLocks::new(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: 25,
            provider_timeout: Duration::from_secs(120),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of loop iterations per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Set the provider timeout.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Replace the default system prompt. An empty prompt disables injection.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run one turn, returning a live ordered stream of events.
    ///
    /// The stream always ends with exactly one terminal event: `agent_done`
    /// on success (truncated or not) or `error` on failure. The transcript
    /// keeps whatever was committed up to the last successful append.
    pub fn run(
        self: Arc<Self>,
        thread_id: ThreadId,
        new_messages: Vec<Message>,
        options: RunOptions,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            if let Err(e) = self
                .run_inner(&thread_id, new_messages, options, &tx)
                .await
            {
                error!(thread_id = %thread_id, error = %e, "Turn failed");
                self.event_bus.publish(DomainEvent::TurnFailed {
                    thread_id: thread_id.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        rx
    }

    async fn run_inner(
        &self,
        thread_id: &ThreadId,
        new_messages: Vec<Message>,
        options: RunOptions,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), Error> {
        // Serialize whole turns per thread id: appends of concurrent turns
        // must never interleave.
        let _guard = self.locks.acquire(thread_id.as_str()).await;

        self.store.ensure_thread(thread_id).await?;

        info!(
            thread_id = %thread_id,
            new_messages = new_messages.len(),
            "Starting turn"
        );

        let transcript = self.store.list_messages(thread_id).await?;
        let mut to_append: Vec<Message> = Vec::new();
        if !self.system_prompt.is_empty()
            && !transcript.iter().any(|m| m.role == Role::System)
            && !new_messages.iter().any(|m| m.role == Role::System)
        {
            to_append.push(Message::system(&self.system_prompt));
        }
        to_append.extend(new_messages);
        if !to_append.is_empty() {
            self.store.append_messages(thread_id, &to_append).await?;
        }

        // Read back so the provider sees exactly what is durably stored,
        // closing any race with other writers before the lock was held.
        let mut working = self.store.list_messages(thread_id).await?;

        let model = options.model.unwrap_or_else(|| self.model.clone());
        let temperature = options.temperature.unwrap_or(self.temperature);
        let max_tokens = options.max_tokens.or(self.max_tokens);
        let tools = self.dispatcher.definitions();

        for iteration in 1..=self.max_iterations {
            debug!(thread_id = %thread_id, iteration, "Awaiting provider");

            let request = ProviderRequest {
                model: model.clone(),
                messages: sanitize_for_provider(&working),
                temperature,
                max_tokens,
                tools: tools.clone(),
            };

            let mut fragments =
                match tokio::time::timeout(self.provider_timeout, self.provider.stream(request))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(ProviderError::Timeout(format!(
                            "provider call exceeded {}s",
                            self.provider_timeout.as_secs()
                        ))
                        .into());
                    }
                };

            // Fresh reconstructor per provider call: accumulation state is
            // scoped to the in-flight message, never the session.
            let mut reconstructor = DeltaReconstructor::new(thread_id.as_str());
            let mut finalized: Option<Message> = None;

            while finalized.is_none() {
                let fragment =
                    match tokio::time::timeout(self.provider_timeout, fragments.recv()).await {
                        Err(_) => {
                            return Err(ProviderError::Timeout(format!(
                                "provider stream stalled for {}s",
                                self.provider_timeout.as_secs()
                            ))
                            .into());
                        }
                        Ok(None) => break,
                        Ok(Some(result)) => result?,
                    };

                let step = reconstructor.push(fragment);
                for event in step.events {
                    if tx.send(event).await.is_err() {
                        debug!(thread_id = %thread_id, "Caller disconnected, aborting turn");
                        return Ok(());
                    }
                }
                finalized = step.finalized.into_iter().next();
            }

            // An in-flight message abandoned without a terminal signal is
            // discarded, never appended.
            let Some(assistant) = finalized else {
                return Err(ProviderError::StreamInterrupted(
                    "provider stream ended without a terminal signal".into(),
                )
                .into());
            };

            self.store
                .append_messages(thread_id, std::slice::from_ref(&assistant))
                .await?;
            self.event_bus.publish(DomainEvent::ResponseGenerated {
                thread_id: thread_id.to_string(),
                model: model.clone(),
                iteration,
                timestamp: Utc::now(),
            });

            if assistant.tool_calls.is_empty() {
                let _ = tx
                    .send(StreamEvent::AgentDone {
                        thread_id: thread_id.to_string(),
                        truncated: false,
                    })
                    .await;
                return Ok(());
            }

            let calls = assistant.tool_calls.clone();
            working.push(assistant);

            // Caller already gone: skip the remaining dispatches for this
            // iteration. Committed appends stay committed.
            if tx.is_closed() {
                debug!(thread_id = %thread_id, "Caller disconnected, skipping tool dispatch");
                return Ok(());
            }

            debug!(thread_id = %thread_id, count = calls.len(), "Handling tool calls");

            // Calls within one message are independent: execute them
            // concurrently, then append results in call order.
            let dispatches = futures::future::join_all(
                calls.iter().map(|call| self.dispatcher.dispatch(call, tx)),
            )
            .await;

            let mut idle = false;
            let mut results = Vec::with_capacity(dispatches.len());
            for dispatch in dispatches {
                self.event_bus.publish(DomainEvent::ToolDispatched {
                    tool_name: dispatch.message.name.clone().unwrap_or_default(),
                    success: dispatch.success,
                    duration_ms: dispatch.duration_ms,
                    timestamp: Utc::now(),
                });
                idle |= dispatch.idle;
                results.push(dispatch.message);
            }

            self.store.append_messages(thread_id, &results).await?;
            if tx
                .send(StreamEvent::ToolMessages {
                    messages: results.clone(),
                })
                .await
                .is_err()
            {
                return Ok(());
            }
            working.extend(results);

            if idle {
                let _ = tx
                    .send(StreamEvent::AgentDone {
                        thread_id: thread_id.to_string(),
                        truncated: false,
                    })
                    .await;
                return Ok(());
            }
        }

        warn!(
            thread_id = %thread_id,
            iterations = self.max_iterations,
            "Iteration budget exhausted, truncating turn"
        );
        let _ = tx
            .send(StreamEvent::AgentDone {
                thread_id: thread_id.to_string(),
                truncated: true,
            })
            .await;
        Ok(())
    }
}

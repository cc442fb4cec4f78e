//! REST + SSE routes for the relay.
//!
//! Endpoints:
//!
//! - `POST   /v1/threads`                        — Create a thread
//! - `GET    /v1/threads/{id}/messages`          — Ordered transcript
//! - `POST   /v1/threads/{id}/messages`          — Append one message
//! - `DELETE /v1/threads/{id}/messages`          — Clear the log, keep the thread
//! - `POST   /v1/threads/{id}/runs`              — Run a turn (SSE or buffered)
//! - `GET    /v1/models`                         — List models
//! - `GET    /v1/logs`                           — SSE domain event stream
//! - `GET    /health`                            — Health check

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::SharedState;
use threadline_agent::{RunOptions, StreamEvent};
use threadline_core::error::StoreError;
use threadline_core::message::{Message, ThreadId};
use threadline_core::store::TranscriptStore;

/// Build the route table. Nest-free: paths carry the /v1 prefix directly.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/threads", post(create_thread_handler))
        .route(
            "/v1/threads/{thread_id}/messages",
            get(list_messages_handler)
                .post(append_message_handler)
                .delete(clear_thread_handler),
        )
        .route("/v1/threads/{thread_id}/runs", post(run_thread_handler))
        .route("/v1/models", get(list_models_handler))
        .route("/v1/logs", get(log_stream_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize, Default)]
struct CreateThreadRequest {
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Optional starting system message
    #[serde(default)]
    system_message: Option<String>,
}

#[derive(Serialize)]
struct CreateThreadResponse {
    thread_id: String,
    created_at: String,
}

#[derive(Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

impl IncomingMessage {
    fn into_message(self) -> Result<Message, String> {
        match self.role.as_str() {
            "system" => Ok(Message::system(self.content)),
            "user" => Ok(Message::user(self.content)),
            other => Err(format!(
                "Unsupported role '{other}': only 'user' and 'system' messages may be posted"
            )),
        }
    }
}

#[derive(Serialize)]
struct ThreadMessagesResponse {
    thread_id: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct AppendMessageResponse {
    success: bool,
    message_id: String,
}

#[derive(Serialize)]
struct ClearThreadResponse {
    success: bool,
    deleted_count: u64,
}

#[derive(Deserialize)]
struct RunRequest {
    #[serde(default)]
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    stream: bool,
}

#[derive(Serialize)]
struct RunResponse {
    thread_id: String,
    truncated: bool,
    /// Messages appended to the transcript by this run, in order.
    messages: Vec<Message>,
}

fn store_error(e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        StoreError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn create_thread_handler(
    State(state): State<SharedState>,
    Json(request): Json<CreateThreadRequest>,
) -> Result<Json<CreateThreadResponse>, (StatusCode, Json<ErrorResponse>)> {
    let thread = state
        .store
        .create_thread(request.metadata.unwrap_or_default())
        .await
        .map_err(store_error)?;

    if let Some(system_message) = request.system_message {
        state
            .store
            .append_messages(&thread.id, &[Message::system(system_message)])
            .await
            .map_err(store_error)?;
    }

    info!(thread_id = %thread.id, "Thread created");
    Ok(Json(CreateThreadResponse {
        thread_id: thread.id.to_string(),
        created_at: thread.created_at.to_rfc3339(),
    }))
}

async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadMessagesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let id = ThreadId::from(&thread_id);
    let messages = state.store.list_messages(&id).await.map_err(store_error)?;
    Ok(Json(ThreadMessagesResponse {
        thread_id,
        messages,
    }))
}

async fn append_message_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    Json(payload): Json<IncomingMessage>,
) -> Result<Json<AppendMessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let message = payload.into_message().map_err(|error| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
    })?;

    let id = ThreadId::from(&thread_id);
    state.store.ensure_thread(&id).await.map_err(store_error)?;
    let message_id = message.id.clone();
    state
        .store
        .append_messages(&id, &[message])
        .await
        .map_err(store_error)?;

    Ok(Json(AppendMessageResponse {
        success: true,
        message_id,
    }))
}

async fn clear_thread_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ClearThreadResponse>, (StatusCode, Json<ErrorResponse>)> {
    let id = ThreadId::from(&thread_id);
    let deleted_count = state.store.clear_messages(&id).await.map_err(store_error)?;
    Ok(Json(ClearThreadResponse {
        success: true,
        deleted_count,
    }))
}

/// `POST /v1/threads/{id}/runs` — run one turn against a thread.
///
/// The caller sends only its newest messages; stored history is replayed
/// server-side. With `stream: true` the response is SSE, one event per
/// [`StreamEvent`], closed by a `[DONE]` marker after the terminal event.
/// Otherwise the turn is buffered to completion and the transcript delta is
/// returned as JSON.
async fn run_thread_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Response {
    let mut new_messages = Vec::with_capacity(payload.messages.len());
    for incoming in payload.messages {
        match incoming.into_message() {
            Ok(message) => new_messages.push(message),
            Err(error) => {
                return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
                    .into_response();
            }
        }
    }

    let id = ThreadId::from(&thread_id);
    let options = RunOptions {
        model: payload.model,
        temperature: payload.temperature,
        max_tokens: payload.max_tokens,
    };

    info!(thread_id = %id, stream = payload.stream, "Relay run requested");

    if payload.stream {
        let rx = state.agent.clone().run(id, new_messages, options);
        let stream = ReceiverStream::new(rx)
            .map(|event| {
                let name = event.event_type();
                let data = serde_json::to_string(&event).unwrap_or_default();
                Ok::<_, Infallible>(SseEvent::default().event(name).data(data))
            })
            .chain(tokio_stream::once(Ok(SseEvent::default().data("[DONE]"))));
        return Sse::new(stream).into_response();
    }

    // Buffered variant: record where the transcript ends now, run the turn
    // to completion, and return everything this run appended.
    if let Err(e) = state.store.ensure_thread(&id).await {
        return store_error(e).into_response();
    }
    let baseline = match state.store.list_messages(&id).await {
        Ok(messages) => messages.len(),
        Err(e) => return store_error(e).into_response(),
    };

    let mut rx = state.agent.clone().run(id.clone(), new_messages, options);
    let mut truncated = false;
    let mut turn_error = None;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::AgentDone { truncated: t, .. } => truncated = t,
            StreamEvent::Error { message } => turn_error = Some(message),
            _ => {}
        }
    }

    if let Some(error) = turn_error {
        return (StatusCode::BAD_GATEWAY, Json(ErrorResponse { error })).into_response();
    }

    match state.store.list_messages(&id).await {
        Ok(messages) => Json(RunResponse {
            thread_id,
            truncated,
            messages: messages.get(baseline..).unwrap_or(&[]).to_vec(),
        })
        .into_response(),
        Err(e) => store_error(e).into_response(),
    }
}

#[derive(Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
}

#[derive(Serialize)]
struct ModelsResponse {
    object: &'static str,
    data: Vec<ModelEntry>,
}

async fn list_models_handler(State(state): State<SharedState>) -> Json<ModelsResponse> {
    // The configured default plus a small static set the relay passes
    // through unchanged. Model routing is the upstream's concern.
    let mut ids = vec![state.default_model.clone()];
    for known in ["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"] {
        if !ids.iter().any(|id| id == known) {
            ids.push(known.to_string());
        }
    }
    Json(ModelsResponse {
        object: "list",
        data: ids
            .into_iter()
            .map(|id| ModelEntry { id, object: "model" })
            .collect(),
    })
}

/// `GET /v1/logs` — SSE stream of domain events (turn progress, tool
/// dispatches, failures).
async fn log_stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.event_bus.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            let event_name = match event.as_ref() {
                threadline_core::event::DomainEvent::ResponseGenerated { .. } => {
                    "response_generated"
                }
                threadline_core::event::DomainEvent::ToolDispatched { .. } => "tool_dispatched",
                threadline_core::event::DomainEvent::TurnFailed { .. } => "turn_failed",
            };
            Ok(SseEvent::default().event(event_name).data(data))
        });

    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GatewayState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use threadline_agent::{AgentLoop, ToolDispatcher};
    use threadline_core::error::ProviderError;
    use threadline_core::event::EventBus;
    use threadline_core::provider::{CompletionResponse, Provider, ProviderRequest};
    use threadline_core::tool::ToolRegistry;
    use threadline_store::InMemoryStore;
    use tower::ServiceExt;

    /// Always answers with a fixed text completion (the default `stream()`
    /// impl turns it into a single terminal fragment).
    struct AckProvider;

    #[async_trait]
    impl Provider for AckProvider {
        fn name(&self) -> &str {
            "ack"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                message: Message::assistant("ack"),
                model: "ack-model".into(),
                usage: None,
            })
        }
    }

    fn test_app() -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let event_bus = Arc::new(EventBus::default());
        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::new(ToolRegistry::new()),
            Duration::from_secs(5),
        ));
        let agent = Arc::new(AgentLoop::new(
            Arc::new(AckProvider),
            store.clone(),
            dispatcher,
            "ack-model",
            event_bus.clone(),
        ));
        let state = Arc::new(GatewayState {
            store: store.clone(),
            agent,
            event_bus,
            default_model: "ack-model".into(),
        });
        (router(state), store)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (app, _) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_thread_returns_id() {
        let (app, _) = test_app();
        let response = app
            .oneshot(post_json("/v1/threads", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["thread_id"].as_str().unwrap().len() > 10);
    }

    #[tokio::test]
    async fn create_thread_with_system_message() {
        let (app, store) = test_app();
        let response = app
            .oneshot(post_json(
                "/v1/threads",
                serde_json::json!({"system_message": "be terse"}),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        let id = ThreadId::from(json["thread_id"].as_str().unwrap());

        let messages = store.list_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_deref(), Some("be terse"));
    }

    #[tokio::test]
    async fn append_and_list_messages() {
        let (app, _) = test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/threads/t-fixed/messages",
                serde_json::json!({"role": "user", "content": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/threads/t-fixed/messages")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn unknown_thread_is_404() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/threads/missing/messages")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn assistant_role_cannot_be_posted() {
        let (app, _) = test_app();
        let response = app
            .oneshot(post_json(
                "/v1/threads/t-1/messages",
                serde_json::json!({"role": "assistant", "content": "forged"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clear_messages_keeps_thread() {
        let (app, store) = test_app();
        app.clone()
            .oneshot(post_json(
                "/v1/threads/t-clear/messages",
                serde_json::json!({"role": "user", "content": "bye"}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/threads/t-clear/messages")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["deleted_count"], 1);
        assert!(store
            .thread_exists(&ThreadId::from("t-clear"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn buffered_run_returns_transcript_delta() {
        let (app, _) = test_app();
        let response = app
            .oneshot(post_json(
                "/v1/threads/t-run/runs",
                serde_json::json!({
                    "messages": [{"role": "user", "content": "hi"}],
                    "stream": false
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["truncated"], false);

        // Delta: injected system prompt, user message, assistant reply.
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hi");
        assert_eq!(messages[2]["content"], "ack");
    }

    #[tokio::test]
    async fn streaming_run_is_event_stream() {
        let (app, _) = test_app();
        let response = app
            .oneshot(post_json(
                "/v1/threads/t-sse/runs",
                serde_json::json!({
                    "messages": [{"role": "user", "content": "hi"}],
                    "stream": true
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("content_delta"));
        assert!(body.contains("agent_done"));
        assert!(body.contains("[DONE]"));
    }

    #[tokio::test]
    async fn models_list_contains_default() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["data"][0]["id"], "ack-model");
    }
}

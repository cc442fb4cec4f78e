//! HTTP relay endpoint for threadline.
//!
//! Exposes thread management and relay runs over REST + SSE.
//! Built on Axum for high performance async HTTP.
//!
//! Protection layers applied to every route:
//! - Request body size limit (1 MB)
//! - In-memory sliding-window rate limiting (health exempt)
//! - CORS with explicit method/header policy
//! - HTTP trace logging

pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use threadline_agent::{AgentLoop, ToolDispatcher};
use threadline_core::event::EventBus;
use threadline_core::store::TranscriptStore;
use threadline_providers::{OpenAiCompatProvider, RetryProvider};
use threadline_store::SqliteStore;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub store: Arc<dyn TranscriptStore>,
    pub agent: Arc<AgentLoop>,
    pub event_bus: Arc<EventBus>,
    pub default_model: String,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router with all middleware layers.
pub fn build_router(state: SharedState, rate_limit_per_minute: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let rate_limiter = Arc::new(RateLimiter::new(
        rate_limit_per_minute,
        Duration::from_secs(60),
    ));

    routes::router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(axum::middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the provider, store, tools, and agent loop once and shares them
/// via Arc across all requests.
pub async fn start(
    config: threadline_config::AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        warn!("No API key configured — set THREADLINE_API_KEY unless the endpoint is local");
    }
    let upstream = OpenAiCompatProvider::new(&config.provider, &config.base_url, api_key)?;
    let provider = Arc::new(
        RetryProvider::new(Arc::new(upstream)).with_max_attempts(config.relay.retry_attempts),
    );

    let db_url = if config.store.path.starts_with("sqlite:") {
        config.store.path.clone()
    } else {
        if let Some(parent) = std::path::Path::new(&config.store.path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        format!("sqlite://{}", config.store.path)
    };
    let store: Arc<dyn TranscriptStore> = Arc::new(SqliteStore::new(&db_url).await?);

    let registry = Arc::new(threadline_tools::default_registry());
    let dispatcher = Arc::new(ToolDispatcher::new(
        registry,
        Duration::from_secs(config.relay.tool_timeout_secs),
    ));

    let event_bus = Arc::new(EventBus::default());
    let agent = Arc::new(
        AgentLoop::new(
            provider,
            store.clone(),
            dispatcher,
            &config.default_model,
            event_bus.clone(),
        )
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_max_iterations(config.relay.max_iterations)
        .with_provider_timeout(Duration::from_secs(config.relay.provider_timeout_secs)),
    );

    let state = Arc::new(GatewayState {
        store,
        agent,
        event_bus,
        default_model: config.default_model.clone(),
    });

    let app = build_router(state, config.gateway.rate_limit_per_minute);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key (peer address or anonymous).
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Evict stale entries if the map grows too large
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Rate limiting middleware. The /health endpoint is exempt so monitoring
/// can poll it freely.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client_key = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

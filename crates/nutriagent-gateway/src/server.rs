use crate::error::ApiError;
use crate::sse;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nutriagent_agent::Orchestrator;
use nutriagent_builtins::ArtifactBackend;
use nutriagent_core::Message;
use nutriagent_session::SessionStore;
use nutriagent_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Character bound on message content in history responses.
const HISTORY_CONTENT_MAX: usize = 500;

/// Browser origins allowed when none are configured (local frontend dev
/// servers).
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://localhost:5174",
];

/// Body of `POST /api/chat` and `POST /api/chat/stream`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message for this turn.
    pub message: String,
    /// Existing thread to continue; omitted or blank starts a new one.
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl ChatRequest {
    /// The caller-supplied thread id, treating blank values as absent.
    fn requested_thread(&self) -> Option<&str> {
        self.thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Body of a completed `POST /api/chat`.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The assistant's final response text.
    pub response: String,
    /// Thread the turn ran against.
    pub thread_id: String,
    /// Locator of a label artifact produced during the turn, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

/// Shared application state.
pub struct AppState {
    /// Drives conversational turns.
    pub orchestrator: Orchestrator,
    /// Session histories read and cleared over HTTP.
    pub sessions: Arc<dyn SessionStore>,
    /// Registered tools advertised at `/api/tools`.
    pub tools: Arc<ToolRegistry>,
    /// Label artifacts served under `/labels`.
    pub artifacts: Arc<dyn ArtifactBackend>,
}

/// The main HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Builds the gateway router with [`DEFAULT_ALLOWED_ORIGINS`].
    pub fn build(
        orchestrator: Orchestrator,
        sessions: Arc<dyn SessionStore>,
        tools: Arc<ToolRegistry>,
        artifacts: Arc<dyn ArtifactBackend>,
    ) -> Router {
        Self::build_with_origins(
            orchestrator,
            sessions,
            tools,
            artifacts,
            DEFAULT_ALLOWED_ORIGINS,
        )
    }

    /// Builds the gateway router allowing the given browser origins.
    pub fn build_with_origins<O: AsRef<str>>(
        orchestrator: Orchestrator,
        sessions: Arc<dyn SessionStore>,
        tools: Arc<ToolRegistry>,
        artifacts: Arc<dyn ArtifactBackend>,
        allowed_origins: &[O],
    ) -> Router {
        let state = Arc::new(AppState {
            orchestrator,
            sessions,
            tools,
            artifacts,
        });

        Router::new()
            .route("/", get(root_handler))
            .route("/api/chat", post(chat_handler))
            .route("/api/chat/stream", post(chat_stream_handler))
            .route(
                "/api/history/{thread_id}",
                get(history_handler).delete(clear_history_handler),
            )
            .route(
                "/api/threads",
                get(list_threads_handler).post(create_thread_handler),
            )
            .route("/api/tools", get(tools_handler))
            .route("/api/health", get(health_handler))
            .route("/labels/{name}", get(label_handler))
            .layer(cors_layer(allowed_origins))
            .with_state(state)
    }
}

fn cors_layer<O: AsRef<str>>(allowed_origins: &[O]) -> CorsLayer {
    let mut origins = Vec::with_capacity(allowed_origins.len());
    for origin in allowed_origins {
        match origin.as_ref().parse::<HeaderValue>() {
            Ok(value) => origins.push(value),
            Err(_) => warn!(origin = origin.as_ref(), "Ignoring malformed CORS origin"),
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "nutriagent",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let sessions = state.sessions.list_all().await?;
    Ok(Json(json!({
        "status": "healthy",
        "agent": "ready",
        "tools_count": state.tools.tool_count(),
        "sessions": sessions.len(),
        "api_version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let output = state
        .orchestrator
        .run(request.requested_thread(), &request.message)
        .await?;

    Ok(Json(ChatResponse {
        response: output.response,
        thread_id: output.thread_id,
        image_path: output.artifact,
    }))
}

async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let turn = state
        .orchestrator
        .open_stream(request.requested_thread(), &request.message)
        .await?;

    Ok(sse::turn_events(turn))
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let messages = state.sessions.history(&thread_id).await?;
    let rows: Vec<Value> = messages.iter().map(message_row).collect();

    Ok(Json(json!({
        "thread_id": thread_id,
        "message_count": rows.len(),
        "messages": rows,
    })))
}

async fn clear_history_handler(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.sessions.clear(&thread_id).await?;
    Ok(Json(json!({ "thread_id": thread_id, "cleared": true })))
}

async fn list_threads_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let mut threads = state.sessions.list_all().await?;
    threads.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

    Ok(Json(json!({ "count": threads.len(), "threads": threads })))
}

async fn create_thread_handler(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let thread_id = state.sessions.ensure(None).await?;
    Ok((StatusCode::CREATED, Json(json!({ "thread_id": thread_id }))))
}

async fn tools_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let descriptors = state.tools.descriptors();
    Json(json!({ "count": descriptors.len(), "tools": descriptors }))
}

async fn label_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let content = state
        .artifacts
        .retrieve(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no label named '{name}'")))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response())
}

/// History row: role, bounded content, timestamp, artifact when present.
fn message_row(message: &Message) -> Value {
    let mut row = json!({
        "role": &message.role,
        "content": truncate_chars(&message.content, HISTORY_CONTENT_MAX),
        "timestamp": &message.timestamp,
    });
    if let Some(ref locator) = message.artifact {
        row["artifact"] = Value::String(locator.clone());
    }
    row
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

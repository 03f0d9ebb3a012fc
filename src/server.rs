//! HTTP API: chat with per-session history plus tool management.

use crate::api::ChatBackend;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::orchestrator::{HistorySettings, Orchestrator, SilentObserver};
use crate::session::{create_new_session, MemorySessionStore, SessionStore};
use crate::tools::{PluginManifest, ToolRegistry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn ChatBackend>,
    /// Replaced wholesale on register/remove; a chat turn keeps the snapshot
    /// it started with.
    pub registry: RwLock<Arc<ToolRegistry>>,
    pub sessions: MemorySessionStore,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn ChatBackend>, registry: ToolRegistry) -> Self {
        let sessions = MemorySessionStore::new(config.expiry_minutes);
        Self {
            config,
            backend,
            registry: RwLock::new(Arc::new(registry)),
            sessions,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error returned by handlers as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = match err {
            ChatError::Api { .. } | ChatError::Network(_) => StatusCode::BAD_GATEWAY,
            ChatError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status, self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub content: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterToolRequest {
    pub tool_name: String,
    pub manifest: Value,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }

    let mut session = match request.session_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => state.sessions.load(id).unwrap_or_else(|| {
            let mut session = create_new_session();
            session.session_id = id.to_string();
            session
        }),
        None => create_new_session(),
    };

    let registry = state.registry.read().await.clone();
    let tools = if state.config.tools_enabled {
        Some(registry.as_ref())
    } else {
        None
    };
    let orchestrator = Orchestrator::from_config(state.backend.as_ref(), tools, &state.config)
        .with_streaming(false);
    let history = HistorySettings::from_config(&state.config);

    let outcome = orchestrator
        .run_session_turn(
            &mut session,
            &request.content,
            &history,
            None,
            &mut SilentObserver,
        )
        .await?;

    state.sessions.save_session(&session)?;

    let last_tool = outcome.tool_invocations.last();
    Ok(Json(ChatResponse {
        content: outcome.content.clone(),
        session_id: session.session_id,
        tool_used: last_tool.map(|t| t.name.clone()),
        tool_result: last_tool.map(|t| t.result.clone()),
    }))
}

async fn register_tool(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterToolRequest>,
) -> std::result::Result<Json<Value>, ApiError> {
    let manifest: PluginManifest = serde_json::from_value(request.manifest)
        .map_err(|e| ApiError::bad_request(format!("Invalid manifest: {}", e)))?;

    let mut registry = state.registry.write().await;
    let mut updated = ToolRegistry::clone(&registry);
    let path = updated
        .register(&request.tool_name, &manifest)
        .map_err(ApiError::bad_request)?;
    *registry = Arc::new(updated);

    info!("registered tool {} at {}", request.tool_name, path.display());
    Ok(Json(json!({
        "status": "success",
        "tool": request.tool_name,
    })))
}

async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    let registry = state.registry.read().await.clone();
    let tools: Vec<Value> = registry
        .list()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
                "builtin": tool.is_builtin(),
            })
        })
        .collect();

    Json(json!({
        "count": tools.len(),
        "tools": tools,
    }))
}

async fn remove_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    let mut registry = state.registry.write().await;
    if registry.get(&name).is_none() {
        return Err(ApiError::not_found(format!("Tool '{}' not found", name)));
    }
    let mut updated = ToolRegistry::clone(&registry);
    updated.remove(&name).map_err(ApiError::bad_request)?;
    *registry = Arc::new(updated);

    info!("removed tool {}", name);
    Ok(Json(json!({
        "status": "success",
        "tool": name,
    })))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let registry = state.registry.read().await.clone();
    Json(json!({
        "status": "ok",
        "tools_loaded": registry.len(),
        "sessions": state.sessions.len(),
    }))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/tools/register", post(register_tool))
        .route("/tools/list", get(list_tools))
        .route("/tools/{name}", delete(remove_tool))
        .route("/status", get(status))
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("toolchat API listening on http://{}", bind_addr);
    println!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

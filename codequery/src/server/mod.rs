//! HTTP surface: Slack Events API endpoint plus a small JSON API.
//!
//! Endpoints:
//! - POST /slack/events - Slack event subscriptions (handled in the background)
//! - POST /api/query - Run a query, optionally inside a session
//! - GET /api/sessions/{id} - Conversation history of a session
//! - DELETE /api/sessions/{id} - Forget a session
//! - GET /health - Liveness check

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::chat::{ChatHandler, HandleOutcome, SlackEnvelope};
use crate::memory::SessionId;
use crate::models::{QueryResult, Turn};
use crate::orchestrator::QueryOrchestrator;

/// Slack sets this on redelivery of an event we were too slow to acknowledge.
const SLACK_RETRY_HEADER: &str = "x-slack-retry-num";

/// Shared server state.
pub struct ServerState {
    pub orchestrator: Arc<QueryOrchestrator>,
    /// Present only when a bot token is configured.
    pub chat: Option<Arc<ChatHandler>>,
    pub repository_path: PathBuf,
    pub timeout: Duration,
}

// === Request/Response Types ===

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub slack: bool,
    pub sessions: usize,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(run_query))
        .route("/api/sessions/{id}", get(get_session).delete(clear_session))
        .route("/slack/events", post(slack_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server and block until it exits.
pub async fn start_server(state: ServerState, addr: SocketAddr) -> Result<()> {
    let slack = state.chat.is_some();
    let repository = state.repository_path.display().to_string();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, %repository, slack, "codequery server listening");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

// === Handlers ===

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        slack: state.chat.is_some(),
        sessions: state.orchestrator.memory().session_count(),
    })
}

async fn run_query(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, StatusCode> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let session = req
        .session_id
        .filter(|id| !id.is_empty())
        .map(SessionId::from_raw);
    let result = state
        .orchestrator
        .run(query, &state.repository_path, state.timeout, session.as_ref())
        .await;
    Ok(Json(result))
}

async fn get_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, StatusCode> {
    let session = SessionId::from_raw(id);
    let turns = state.orchestrator.memory().get_context(&session);
    if turns.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(SessionResponse {
        session_id: session.to_string(),
        turns,
    }))
}

async fn clear_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> StatusCode {
    state.orchestrator.memory().clear_session(&SessionId::from_raw(id));
    StatusCode::NO_CONTENT
}

/// Acknowledge immediately and answer in the background; Slack expects a
/// response within three seconds and queries take much longer.
async fn slack_events(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(envelope): Json<SlackEnvelope>,
) -> Response {
    match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            Json(serde_json::json!({ "challenge": challenge })).into_response()
        }
        SlackEnvelope::EventCallback { event } => {
            let Some(handler) = state.chat.clone() else {
                tracing::warn!("Slack event received but no bot token is configured");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            };
            if let Some(retry) = headers.get(SLACK_RETRY_HEADER) {
                tracing::debug!(?retry, "Skipping Slack redelivery");
                return StatusCode::OK.into_response();
            }
            tokio::spawn(async move {
                if let HandleOutcome::Answered(result) = handler.handle(event).await {
                    tracing::debug!(
                        success = result.success,
                        execution_time_ms = result.execution_time_ms,
                        "Slack event answered"
                    );
                }
            });
            StatusCode::OK.into_response()
        }
        SlackEnvelope::Unknown => StatusCode::OK.into_response(),
    }
}

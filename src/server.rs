use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{delete, get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppState;
use crate::activity::ActivityState;
use crate::config::AppConfig;
use crate::credentials::{CredentialRequest, CredentialResponse, IssueError};

/// Name of the SSE event carrying an activity snapshot.
pub const ACTIVITY_EVENT: &str = "activity";

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// How often idle sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    info!(
        name: "platform.config.loaded",
        feed_base_url = %config.platform.feed_base_url,
        agent_api_url = %config.platform.agent_api_url,
        api_key_set = !config.platform.api_key.is_empty(),
        remote_credentials = config.stream.credentials_url.is_some(),
        "Platform configuration loaded"
    );
    if config.platform.api_key.is_empty() {
        warn!(
            name: "platform.config.no_api_key",
            "No platform API key configured; feed credentials and agent calls will fail"
        );
    }

    let state = AppState::from_config(Arc::clone(&config))?;

    // Idle session sweeper
    let sessions = state.sessions.clone();
    let idle_timeout = config.sessions.idle_timeout();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(idle_timeout);
            if removed > 0 {
                info!(name: "session.swept", removed, remaining = sessions.len(), "Removed idle sessions");
            }
        }
    });

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the HTTP API.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/agent-events", post(api_agent_events))
        .route("/api/chat", post(api_chat))
        .route("/api/sessions", post(api_create_session))
        .route("/api/sessions/{id}", delete(api_delete_session))
        .route("/api/sessions/{id}/activity", get(api_get_activity))
        .route("/api/sessions/{id}/activity/stream", get(api_activity_stream))
        .route("/api/sessions/{id}/activity/reset", post(api_reset_activity))
        .route("/api/sessions/{id}/processing", post(api_set_processing))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/agent-events - Exchange a session id for feed credentials.
async fn api_agent_events(
    State(state): State<AppState>,
    payload: Result<Json<CredentialRequest>, JsonRejection>,
) -> (StatusCode, Json<CredentialResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(name: "credentials.bad_request", error = %rejection.body_text(), "Malformed credential request");
            return (
                StatusCode::BAD_REQUEST,
                Json(CredentialResponse::rejected("invalid request body")),
            );
        }
    };

    let session_id = request.session_id.unwrap_or_default();
    match state.issuer.issue(&session_id) {
        Ok(credentials) => {
            info!(name: "credentials.issued", session_id = %session_id, "Feed credentials issued");
            (
                StatusCode::OK,
                Json(CredentialResponse::issued(credentials)),
            )
        }
        Err(e @ IssueError::MissingSession) => (
            StatusCode::BAD_REQUEST,
            Json(CredentialResponse::rejected(e.to_string())),
        ),
        Err(e @ IssueError::NotConfigured) => {
            warn!(name: "credentials.not_configured", "Credential request refused: no platform API key");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CredentialResponse::rejected(e.to_string())),
            )
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions and activity
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SessionCreated {
    session_id: String,
}

/// POST /api/sessions - Create a session with its own activity stream.
async fn api_create_session(State(state): State<AppState>) -> Json<SessionCreated> {
    let session = state.sessions.create();
    info!(name: "session.created", session_id = %session.id(), "Session created");
    Json(SessionCreated {
        session_id: session.id().to_string(),
    })
}

/// DELETE /api/sessions/:id - Drop a session and close its feed.
async fn api_delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// GET /api/sessions/:id/activity - Current activity snapshot.
async fn api_get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActivityState>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    session.touch();
    Ok(Json(session.stream().snapshot()))
}

/// GET /api/sessions/:id/activity/stream - Activity snapshots as SSE.
async fn api_activity_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    session.touch();

    let updates = WatchStream::new(session.stream().subscribe()).filter_map(|snapshot| async move {
        match Event::default().event(ACTIVITY_EVENT).json_data(&snapshot) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                warn!(name: "activity.sse.encode_failed", error = %e, "Failed to encode activity snapshot");
                None
            }
        }
    });

    Ok(Sse::new(updates).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

/// POST /api/sessions/:id/activity/reset - Clear activity and close the feed.
async fn api_reset_activity(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.get(&id) {
        Some(session) => {
            session.touch();
            session.stream().reset();
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

#[derive(Debug, Deserialize)]
struct ProcessingRequest {
    processing: bool,
}

/// POST /api/sessions/:id/processing - Toggle the outstanding-request flag.
async fn api_set_processing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ProcessingRequest>,
) -> Result<Json<ActivityState>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    session.touch();
    session.stream().set_processing(req.processing);
    Ok(Json(session.stream().snapshot()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    /// Optional session ID (creates new if not provided).
    #[serde(default)]
    session_id: Option<String>,
    /// Overrides the configured agent.
    #[serde(default)]
    agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    response: String,
    insights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendation: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// POST /api/chat - Ask the agent, streaming its activity to the session meanwhile.
async fn api_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let message = req.message.trim();
    if message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is required");
    }

    let agent_id = req
        .agent_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| state.config.platform.agent_id.clone());
    if agent_id.is_empty() {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "agent id not configured");
    }

    let session = match req.session_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => state.sessions.get_or_create(id),
        None => state.sessions.create(),
    };
    session.touch();

    info!(
        name: "chat.request",
        session_id = %session.id(),
        agent_id = %agent_id,
        chars = message.chars().count(),
        "Received chat request"
    );

    let request = session.begin_request();
    let result = state.agent.chat(message, &agent_id, session.id()).await;
    drop(request);
    session.touch();

    match result {
        Ok(reply) => Json(ChatResponse {
            session_id: session.id().to_string(),
            response: reply.response,
            insights: reply.insights,
            recommendation: reply.recommendation,
        })
        .into_response(),
        Err(e) => {
            warn!(name: "chat.failed", session_id = %session.id(), error = %e, "Agent call failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

//! Operator REST handlers for runtime simulation control.
//!
//! Start, pause, resume, speed, and stop act directly on the shared
//! operator state. Everything that changes simulation state is sent to the
//! scheduler as a command and answered once it has been applied.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/simulation/start` | Set agents in motion |
//! | `POST` | `/api/simulation/pause` | Pause the tick loop |
//! | `POST` | `/api/simulation/resume` | Resume the tick loop |
//! | `POST` | `/api/simulation/speed` | Set tick interval (ms) |
//! | `POST` | `/api/simulation/stop` | Trigger clean shutdown |
//! | `POST` | `/api/world-event` | Set the world event |
//! | `DELETE` | `/api/world-event` | Clear the world event |
//! | `POST` | `/api/agents/{id}/chat` | Chat privately with an agent |
//! | `DELETE` | `/api/conversations/{id}` | End a live conversation |
//! | `POST` | `/api/sync/flush` | Flush the sync queue now |

use std::sync::Arc;

use agora_core::FlushOutcome;
use agora_core::operator::MIN_TICK_INTERVAL_MS;
use agora_types::{AgentId, ConversationId, SessionId};
use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::error::ObserverError;
use crate::handlers::parse_uuid;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/simulation/speed`.
#[derive(Debug, serde::Deserialize)]
pub struct SetSpeedRequest {
    /// New tick interval in milliseconds.
    pub tick_interval_ms: u64,
}

/// Request body for `POST /api/world-event`.
#[derive(Debug, serde::Deserialize)]
pub struct WorldEventRequest {
    /// What is happening.
    pub description: String,
}

/// Request body for `POST /api/agents/{id}/chat`.
#[derive(Debug, serde::Deserialize)]
pub struct ChatRequest {
    /// Session to continue; omitted to open a new one.
    pub session_id: Option<SessionId>,
    /// The user's message.
    pub message: String,
}

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the operation succeeded.
    ok: bool,
    /// Human-readable message.
    message: String,
}

fn respond(message: &str) -> Json<OperatorResponse> {
    Json(OperatorResponse {
        ok: true,
        message: message.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// Set agents in motion.
pub async fn start(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.operator.start() {
        respond("Simulation started")
    } else {
        respond("Simulation already started")
    }
}

/// Pause the simulation tick loop.
///
/// In-flight reasoner calls still complete; their results are applied.
pub async fn pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.operator.pause();
    respond("Simulation paused")
}

/// Resume the simulation tick loop after a pause.
pub async fn resume(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.operator.resume();
    respond("Simulation resumed")
}

/// Change the tick interval at runtime.
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetSpeedRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    state
        .operator
        .set_tick_interval_ms(body.tick_interval_ms)
        .map_or_else(
            || {
                Err(ObserverError::BadRequest(format!(
                    "tick_interval_ms must be at least {MIN_TICK_INTERVAL_MS}"
                )))
            },
            |prev| {
                Ok(Json(serde_json::json!({
                    "ok": true,
                    "message": format!("Tick interval changed from {prev}ms to {}ms", body.tick_interval_ms),
                    "previous_interval_ms": prev,
                    "new_interval_ms": body.tick_interval_ms,
                })))
            },
        )
}

/// Stop the simulation after a final flush.
///
/// The HTTP server keeps serving the last snapshot.
pub async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("Operator requested simulation stop");
    state.operator.request_stop();
    respond("Simulation stop requested")
}

// ---------------------------------------------------------------------------
// World event
// ---------------------------------------------------------------------------

/// Set the world event and broadcast it to live conversations.
pub async fn set_world_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WorldEventRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let event = state.handle.set_world_event(body.description).await?;
    Ok(Json(event))
}

/// Clear the world event.
pub async fn clear_world_event(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let cleared = state.handle.clear_world_event().await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "cleared": cleared,
    })))
}

// ---------------------------------------------------------------------------
// Chat and conversations
// ---------------------------------------------------------------------------

/// Send a private message to an agent and wait for the reply.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let agent_id = AgentId::from(parse_uuid(&id)?);
    let reply = state
        .handle
        .private_chat(agent_id, body.session_id, body.message)
        .await?;
    Ok(Json(reply))
}

/// End a live conversation; both participants wander.
pub async fn reset_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let conversation_id = ConversationId::from(parse_uuid(&id)?);
    state.handle.reset_conversation(conversation_id).await?;
    Ok(respond("Conversation reset"))
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Flush the sync queue without waiting for the timer.
pub async fn flush(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let outcome = state.handle.flush_now().await?;
    let body = match outcome {
        FlushOutcome::Empty => serde_json::json!({ "ok": true, "outcome": "empty" }),
        FlushOutcome::InFlight => serde_json::json!({ "ok": true, "outcome": "in_flight" }),
        FlushOutcome::Flushed { records } => {
            serde_json::json!({ "ok": true, "outcome": "flushed", "records": records })
        }
        FlushOutcome::Failed { error } => {
            serde_json::json!({ "ok": false, "outcome": "failed", "error": error.to_string() })
        }
    };
    Ok(Json(body))
}

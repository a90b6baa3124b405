//! Read-only REST handlers.
//!
//! All handlers read from the in-memory [`SimulationSnapshot`] via the
//! shared [`AppState`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Tick, controls, world event, queue depths |
//! | `GET` | `/api/agents` | List all agents |
//! | `GET` | `/api/agents/{id}` | Get a single agent |
//! | `GET` | `/api/conversations` | List live conversations |
//!
//! [`SimulationSnapshot`]: agora_core::SimulationSnapshot

use std::sync::Arc;

use agora_core::OperatorStatus;
use agora_core::sync::QueueDepths;
use agora_types::{AgentId, WorldEvent};
use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::error::ObserverError;
use crate::state::AppState;

/// Response body for `GET /api/status`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StatusResponse {
    /// Operator controls.
    pub operator: OperatorStatus,
    /// Ticks run so far.
    pub tick: u64,
    /// Simulated milliseconds elapsed.
    pub sim_time_ms: u64,
    /// Number of agents.
    pub agents: usize,
    /// Number of live conversations.
    pub conversations: usize,
    /// The current world event, if any.
    pub world_event: Option<WorldEvent>,
    /// Records waiting to be persisted, per buffer.
    pub queue: QueueDepths,
    /// Whether a flush is in flight.
    pub flush_in_flight: bool,
}

/// Return tick, controls, world event, and sync queue depths.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(StatusResponse {
        operator: state.operator.status(),
        tick: snapshot.tick,
        sim_time_ms: snapshot.sim_time_ms,
        agents: snapshot.agents.len(),
        conversations: snapshot.conversations.len(),
        world_event: snapshot.world_event.clone(),
        queue: snapshot.queue,
        flush_in_flight: snapshot.flush_in_flight,
    })
}

/// List all agents in roster order.
pub async fn list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.agents.clone())
}

/// Get a single agent by ID.
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let agent_id = AgentId::from(parse_uuid(&id)?);
    let snapshot = state.snapshot.read().await;
    let agent = snapshot
        .agents
        .iter()
        .find(|a| a.id == agent_id)
        .cloned()
        .ok_or_else(|| ObserverError::NotFound(format!("agent {id}")))?;
    Ok(Json(agent))
}

/// List live conversations.
pub async fn list_conversations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.conversations.clone())
}

/// Parse a UUID path segment.
pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, ObserverError> {
    Uuid::parse_str(raw).map_err(|e| ObserverError::InvalidUuid(format!("{raw}: {e}")))
}

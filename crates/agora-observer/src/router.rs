//! Axum router construction for the operator API.
//!
//! Assembles all routes into a single [`Router`] with CORS and HTTP
//! tracing middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;

/// Build the complete Axum router for the operator API.
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Reads
        .route("/api/status", get(handlers::status))
        .route("/api/agents", get(handlers::list_agents))
        .route("/api/agents/{id}", get(handlers::get_agent))
        .route("/api/conversations", get(handlers::list_conversations))
        // Controls
        .route("/api/simulation/start", post(operator::start))
        .route("/api/simulation/pause", post(operator::pause))
        .route("/api/simulation/resume", post(operator::resume))
        .route("/api/simulation/speed", post(operator::set_speed))
        .route("/api/simulation/stop", post(operator::stop))
        // Commands
        .route(
            "/api/world-event",
            post(operator::set_world_event).delete(operator::clear_world_event),
        )
        .route("/api/agents/{id}/chat", post(operator::chat))
        .route("/api/conversations/{id}", delete(operator::reset_conversation))
        .route("/api/sync/flush", post(operator::flush))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

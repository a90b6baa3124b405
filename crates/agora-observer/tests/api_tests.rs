//! Integration tests for the operator API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Commands are served by a real scheduler driven
//! by a scripted reasoner and an in-memory sink.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use agora_core::{
    MemorySink, OperatorState, ScriptedReasoner, Simulation, SimulationConfig, SimulationContext,
    SimulationHandle,
};
use agora_observer::router::build_router;
use agora_observer::state::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

async fn make_test_state() -> Arc<AppState> {
    let ctx = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
    let mut sim = Simulation::new(
        ctx,
        Arc::new(ScriptedReasoner::new()),
        Arc::new(MemorySink::new()),
    );
    let operator = Arc::new(OperatorState::new(100, false));
    let (handle, mut rx) = SimulationHandle::channel(16);
    let state = Arc::new(AppState::new(handle, operator));
    state.publish(sim.snapshot()).await;

    let serving = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            sim.handle(command);
            sim.run_until_idle().await;
            serving.publish(sim.snapshot()).await;
        }
    });
    state
}

async fn send(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = build_router(Arc::clone(state))
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn first_agent_id(state: &Arc<AppState>) -> String {
    let (_, agents) = send(state, "GET", "/api/agents", None).await;
    agents
        .get(0)
        .and_then(|a| a.get("id"))
        .and_then(Value::as_str)
        .unwrap()
        .to_owned()
}

#[tokio::test]
async fn status_reports_roster_and_controls() {
    let state = make_test_state().await;
    let (status, body) = send(&state, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agents"], 5);
    assert_eq!(body["conversations"], 0);
    assert_eq!(body["operator"]["started"], false);
    assert_eq!(body["queue"]["conversation_messages"], 0);
}

#[tokio::test]
async fn agents_can_be_listed_and_fetched() {
    let state = make_test_state().await;
    let (status, agents) = send(&state, "GET", "/api/agents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agents.as_array().map(Vec::len), Some(5));

    let id = first_agent_id(&state).await;
    let (status, agent) = send(&state, "GET", &format!("/api/agents/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["id"], id.as_str());
    assert_eq!(agent["state"], "wandering");
}

#[tokio::test]
async fn unknown_and_malformed_agent_ids() {
    let state = make_test_state().await;
    let missing = uuid_like();
    let (status, _) = send(&state, "GET", &format!("/api/agents/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&state, "GET", "/api/agents/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn controls_update_operator_state() {
    let state = make_test_state().await;
    let (status, _) = send(&state, "POST", "/api/simulation/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.operator.is_started());

    send(&state, "POST", "/api/simulation/pause", None).await;
    assert!(state.operator.is_paused());
    send(&state, "POST", "/api/simulation/resume", None).await;
    assert!(state.operator.is_running());

    send(&state, "POST", "/api/simulation/stop", None).await;
    assert!(state.operator.is_stop_requested());
}

#[tokio::test]
async fn speed_is_validated() {
    let state = make_test_state().await;
    let body = serde_json::json!({ "tick_interval_ms": 1 });
    let (status, _) = send(&state, "POST", "/api/simulation/speed", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = serde_json::json!({ "tick_interval_ms": 250 });
    let (status, reply) = send(&state, "POST", "/api/simulation/speed", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["previous_interval_ms"], 100);
    assert_eq!(state.operator.tick_interval_ms(), 250);
}

#[tokio::test]
async fn world_event_set_and_clear() {
    let state = make_test_state().await;
    let body = serde_json::json!({ "description": "  A festival begins.  " });
    let (status, event) = send(&state, "POST", "/api/world-event", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["description"], "A festival begins.");

    let (status, cleared) = send(&state, "DELETE", "/api/world-event", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["cleared"]["description"], "A festival begins.");

    let blank = serde_json::json!({ "description": "   " });
    let (status, _) = send(&state, "POST", "/api/world-event", Some(blank)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn private_chat_round_trip_and_flush() {
    let state = make_test_state().await;
    let (_, outcome) = send(&state, "POST", "/api/sync/flush", None).await;
    assert_eq!(outcome["outcome"], "empty");

    let id = first_agent_id(&state).await;
    let body = serde_json::json!({ "message": "Hello there" });
    let (status, reply) = send(&state, "POST", &format!("/api/agents/{id}/chat"), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["reply"], "Nice to hear from you.");
    assert_eq!(reply["fallback"], false);
    assert!(reply["session_id"].is_string());

    let (_, outcome) = send(&state, "POST", "/api/sync/flush", None).await;
    assert_eq!(outcome["outcome"], "flushed");
    assert_eq!(outcome["records"], 2);
}

#[tokio::test]
async fn chat_with_unknown_agent_is_not_found() {
    let state = make_test_state().await;
    let body = serde_json::json!({ "message": "Anyone?" });
    let uri = format!("/api/agents/{}/chat", uuid_like());
    let (status, _) = send(&state, "POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resetting_unknown_conversation_is_not_found() {
    let state = make_test_state().await;
    let uri = format!("/api/conversations/{}", uuid_like());
    let (status, _) = send(&state, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, conversations) = send(&state, "GET", "/api/conversations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversations, serde_json::json!([]));
}

fn uuid_like() -> String {
    agora_types::AgentId::new().to_string()
}

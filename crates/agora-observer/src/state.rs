//! Shared application state for the operator API.
//!
//! Reads are served from an in-memory [`SimulationSnapshot`] that the
//! engine replaces as the simulation advances, so a read never waits on
//! the scheduler. Writes travel to the scheduler as commands through the
//! [`SimulationHandle`]; start, pause, speed, and stop go straight to the
//! shared [`OperatorState`].

use std::sync::Arc;

use agora_core::{OperatorState, SimulationHandle, SimulationSnapshot};
use tokio::sync::RwLock;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The latest simulation snapshot.
    pub snapshot: Arc<RwLock<SimulationSnapshot>>,
    /// Command channel into the scheduler.
    pub handle: SimulationHandle,
    /// Shared operator control state.
    pub operator: Arc<OperatorState>,
}

impl AppState {
    /// Create application state with an empty snapshot.
    pub fn new(handle: SimulationHandle, operator: Arc<OperatorState>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(SimulationSnapshot::default())),
            handle,
            operator,
        }
    }

    /// Replace the served snapshot.
    pub async fn publish(&self, snapshot: SimulationSnapshot) {
        *self.snapshot.write().await = snapshot;
    }

    /// Replace the served snapshot unless a reader holds it.
    ///
    /// Returns `false` if the update was skipped.
    pub fn try_publish(&self, snapshot: SimulationSnapshot) -> bool {
        self.snapshot.try_write().is_ok_and(|mut current| {
            *current = snapshot;
            true
        })
    }
}

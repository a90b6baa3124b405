//! Snapshot callback that updates the operator API state.

use std::sync::Arc;

use agora_core::{SimulationSnapshot, SnapshotCallback};
use agora_observer::AppState;
use tracing::trace;

/// Callback that bridges the scheduler loop to the operator API.
pub struct ObserverCallback {
    state: Arc<AppState>,
}

impl ObserverCallback {
    /// Create a new observer callback backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl SnapshotCallback for ObserverCallback {
    fn on_snapshot(&mut self, snapshot: SimulationSnapshot) {
        // A reader holding the lock means this update is skipped; the next
        // loop iteration catches up.
        if !self.state.try_publish(snapshot) {
            trace!("snapshot busy, update skipped");
        }
    }
}

//! Start, pause, speed, and stop controls shared with the operator API.
//!
//! Controls are plain atomics behind an `Arc`: HTTP handlers write them,
//! the run loop reads them once per iteration. Every write also fires a
//! [`Notify`] so a loop parked on its timers re-reads the controls at once
//! (a new tick interval takes effect without waiting out the old one).
//!
//! Unlike commands, controls never touch simulation state directly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Smallest accepted real-time tick interval.
pub const MIN_TICK_INTERVAL_MS: u64 = 10;

/// Shared operator control state.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether agents have been set in motion.
    started: AtomicBool,

    /// Whether the simulation is currently paused.
    paused: AtomicBool,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes the run loop when any control changes.
    changed: Notify,

    /// Current real-time tick interval in milliseconds.
    tick_interval_ms: AtomicU64,

    /// Wall-clock time the operator state was created.
    created_at: DateTime<Utc>,
}

impl OperatorState {
    /// Create operator state. With `autostart`, agents move immediately.
    pub fn new(tick_interval_ms: u64, autostart: bool) -> Self {
        Self {
            started: AtomicBool::new(autostart),
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            changed: Notify::new(),
            tick_interval_ms: AtomicU64::new(tick_interval_ms.max(MIN_TICK_INTERVAL_MS)),
            created_at: Utc::now(),
        }
    }

    fn flip(&self, flag: &AtomicBool, value: bool) -> bool {
        let previous = flag.swap(value, Ordering::AcqRel);
        self.changed.notify_one();
        previous
    }

    /// Set agents in motion. Returns `false` if they already were.
    pub fn start(&self) -> bool {
        !self.flip(&self.started, true)
    }

    /// Whether agents have been set in motion.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether ticks are held.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Hold ticks. In-flight reasoner work still completes.
    pub fn pause(&self) {
        self.flip(&self.paused, true);
    }

    /// Release held ticks.
    pub fn resume(&self) {
        self.flip(&self.paused, false);
    }

    /// Whether ticks should run: started, not paused, not stopping.
    pub fn is_running(&self) -> bool {
        self.is_started() && !self.is_paused() && !self.is_stop_requested()
    }

    /// Resolves on the next control write.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Ask the run loop to finish with a final flush. Irreversible.
    pub fn request_stop(&self) {
        self.flip(&self.stop_requested, true);
    }

    /// Whether a stop has been asked for.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Real-time milliseconds between ticks.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the real-time tick interval; simulated time per tick is
    /// unaffected. Returns the old interval, or `None` below
    /// [`MIN_TICK_INTERVAL_MS`].
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_TICK_INTERVAL_MS {
            return None;
        }
        let prev = self.tick_interval_ms.swap(ms, Ordering::AcqRel);
        self.changed.notify_one();
        Some(prev)
    }

    /// Wall-clock seconds since the controls were created.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.created_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }

    /// Current control values.
    pub fn status(&self) -> OperatorStatus {
        OperatorStatus {
            started: self.is_started(),
            paused: self.is_paused(),
            stop_requested: self.is_stop_requested(),
            tick_interval_ms: self.tick_interval_ms(),
            elapsed_seconds: self.elapsed_seconds(),
        }
    }
}

/// Control values as reported by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStatus {
    /// Whether agents have been set in motion.
    pub started: bool,
    /// Whether the simulation is paused.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Current tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Wall-clock seconds since startup.
    pub elapsed_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autostart_controls_initial_state() {
        let state = OperatorState::new(100, false);
        assert!(!state.is_started());
        assert!(!state.is_running());
        assert!(state.start());
        assert!(!state.start());
        assert!(state.is_running());
    }

    #[test]
    fn pause_and_resume() {
        let state = OperatorState::new(100, true);
        state.pause();
        assert!(state.is_paused());
        assert!(!state.is_running());
        state.resume();
        assert!(state.is_running());
    }

    #[test]
    fn stop_request() {
        let state = OperatorState::new(100, true);
        assert!(!state.is_stop_requested());
        state.request_stop();
        assert!(state.is_stop_requested());
        assert!(!state.is_running());
    }

    #[test]
    fn set_tick_interval() {
        let state = OperatorState::new(100, true);
        assert_eq!(state.set_tick_interval_ms(250), Some(100));
        assert_eq!(state.tick_interval_ms(), 250);
    }

    #[test]
    fn reject_too_fast_interval() {
        let state = OperatorState::new(100, true);
        assert!(state.set_tick_interval_ms(1).is_none());
        assert_eq!(state.tick_interval_ms(), 100);
    }

    #[tokio::test]
    async fn control_change_wakes_waiter() {
        let state = std::sync::Arc::new(OperatorState::new(100, false));
        let waiter = {
            let state = std::sync::Arc::clone(&state);
            tokio::spawn(async move { state.changed().await })
        };
        state.start();
        assert!(waiter.await.is_ok());
    }
}

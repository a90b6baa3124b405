//! Simulation loop runner with operator controls.
//!
//! This module provides [`run_simulation`], the top-level async function
//! that drives the scheduler in real time with support for:
//!
//! - **Start/pause/resume**: ticks only run while the operator allows it
//! - **Variable tick speed**: tick interval adjustable at runtime
//! - **Periodic flush**: the sync queue is submitted on its own timer
//! - **Operator commands**: applied between ticks, never during one
//! - **Clean shutdown**: no new work, final flush, final snapshot
//!
//! Reasoner completions, commands, and timers are multiplexed with
//! `tokio::select!` so that a slow reasoner call never holds up a tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::ClockError;
use crate::command::Command;
use crate::operator::OperatorState;
use crate::reasoner::Reasoner;
use crate::scheduler::Simulation;
use crate::snapshot::SimulationSnapshot;
use crate::sync::{FlushOutcome, PersistenceSink};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The clock could not advance. The loop stopped and the final flush
    /// still ran.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        source: ClockError,
        /// Outcome of the flush run after the loop stopped.
        final_flush: FlushOutcome,
    },
}

/// Result of the simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    /// Total number of ticks executed.
    pub total_ticks: u64,
    /// Outcome of the flush run at shutdown.
    pub final_flush: FlushOutcome,
}

/// Callback invoked whenever observable state has changed.
///
/// Implementations can use this to update the observer snapshot.
pub trait SnapshotCallback: Send {
    /// Called with a fresh copy of the observable state.
    fn on_snapshot(&mut self, snapshot: SimulationSnapshot);
}

/// A no-op callback for testing.
pub struct NoOpCallback;

impl SnapshotCallback for NoOpCallback {
    fn on_snapshot(&mut self, _snapshot: SimulationSnapshot) {}
}

/// Run the simulation until the operator requests a stop.
///
/// # Arguments
///
/// * `sim` - The scheduler and its state
/// * `operator` - Shared operator control state
/// * `commands` - Receiver side of the command channel
/// * `callback` - Called after each tick, applied completion, flush start,
///   or handled command, and once more after shutdown
///
/// # Errors
///
/// Returns [`RunnerError::Clock`] if the clock overflows. Queued records are
/// still submitted by the final flush before it returns.
pub async fn run_simulation<R: Reasoner, S: PersistenceSink>(
    sim: &mut Simulation<R, S>,
    operator: &Arc<OperatorState>,
    commands: &mut mpsc::Receiver<Command>,
    callback: &mut dyn SnapshotCallback,
) -> Result<SimulationResult, RunnerError> {
    let mut total_ticks: u64 = 0;
    let mut interval_ms = operator.tick_interval_ms();
    let mut tick_timer = tick_interval(interval_ms);
    let flush_period = Duration::from_millis(sim.context().config.sync.flush_interval_ms);
    let first_flush = Instant::now()
        .checked_add(flush_period)
        .unwrap_or_else(Instant::now);
    let mut flush_timer = time::interval_at(first_flush, flush_period);
    flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut commands_open = true;
    let mut halted = None;

    info!(
        agents = sim.context().agents.len(),
        tick_interval_ms = interval_ms,
        flush_interval_ms = sim.context().config.sync.flush_interval_ms,
        started = operator.is_started(),
        "Simulation starting"
    );

    loop {
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            break;
        }

        let current = operator.tick_interval_ms();
        if current != interval_ms {
            debug!(from = interval_ms, to = current, "tick interval changed");
            interval_ms = current;
            tick_timer = tick_interval(interval_ms);
        }

        let changed = tokio::select! {
            () = operator.changed() => false,
            _ = tick_timer.tick(), if operator.is_running() => match sim.tick() {
                Ok(_) => {
                    total_ticks = total_ticks.saturating_add(1);
                    true
                }
                Err(source) => {
                    error!(error = %source, total_ticks, "Tick failed, stopping");
                    halted = Some(source);
                    break;
                }
            },
            _ = flush_timer.tick() => {
                let started = sim.start_flush();
                if !started && sim.context().sync.is_in_flight() {
                    debug!("previous flush still in flight, skipping");
                }
                started
            }
            Some(completion) = sim.next_completion(), if sim.has_in_flight() => {
                sim.apply(completion);
                true
            }
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    sim.handle(command);
                    true
                }
                None => {
                    warn!("command channel closed");
                    commands_open = false;
                    false
                }
            },
        };

        if changed {
            callback.on_snapshot(sim.snapshot());
        }
    }

    let final_flush = sim.shutdown().await;
    callback.on_snapshot(sim.snapshot());
    if let Some(source) = halted {
        log_final_flush(&final_flush);
        return Err(RunnerError::Clock {
            source,
            final_flush,
        });
    }
    Ok(SimulationResult {
        total_ticks,
        final_flush,
    })
}

/// Log the simulation end sequence.
///
/// This should be called after [`run_simulation`] returns. The HTTP server
/// may keep serving the final snapshot afterwards.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(total_ticks = result.total_ticks, "Simulation ended");
    log_final_flush(&result.final_flush);
}

fn log_final_flush(outcome: &FlushOutcome) {
    match outcome {
        FlushOutcome::Flushed { records } => info!(records, "Final flush persisted"),
        FlushOutcome::Empty => info!("Nothing left to persist"),
        FlushOutcome::InFlight => warn!("Final flush did not run"),
        FlushOutcome::Failed { error } => {
            warn!(error = %error, "Final flush failed, queued records are lost");
        }
    }
}

fn tick_interval(ms: u64) -> Interval {
    let mut interval = time::interval(Duration::from_millis(ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agora_types::{CardId, EncounterStep, StepType};
    use chrono::Utc;

    use super::*;
    use crate::command::SimulationHandle;
    use crate::config::SimulationConfig;
    use crate::context::SimulationContext;
    use crate::reasoner::ScriptedReasoner;
    use crate::sync::MemorySink;

    struct CountingCallback {
        snapshots: usize,
        last_tick: u64,
    }

    impl SnapshotCallback for CountingCallback {
        fn on_snapshot(&mut self, snapshot: SimulationSnapshot) {
            self.snapshots = self.snapshots.saturating_add(1);
            self.last_tick = snapshot.tick;
        }
    }

    fn simulation() -> (Simulation<ScriptedReasoner, MemorySink>, Arc<MemorySink>) {
        let ctx = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        let sink = Arc::new(MemorySink::new());
        let sim = Simulation::new(ctx, Arc::new(ScriptedReasoner::new()), Arc::clone(&sink));
        (sim, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_runs_no_ticks() {
        let (mut sim, sink) = simulation();
        let operator = Arc::new(OperatorState::new(100, true));
        let (_handle, mut rx) = SimulationHandle::channel(8);
        operator.request_stop();

        let result = run_simulation(&mut sim, &operator, &mut rx, &mut NoOpCallback)
            .await
            .unwrap();
        assert_eq!(result.total_ticks, 0);
        assert_eq!(result.final_flush, FlushOutcome::Empty);
        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_ticks_until_stopped() {
        let (mut sim, _sink) = simulation();
        let operator = Arc::new(OperatorState::new(100, true));
        let (_handle, mut rx) = SimulationHandle::channel(8);
        let stopper = {
            let operator = Arc::clone(&operator);
            tokio::spawn(async move {
                time::sleep(Duration::from_secs(1)).await;
                operator.request_stop();
            })
        };

        let mut callback = CountingCallback {
            snapshots: 0,
            last_tick: 0,
        };
        let result = run_simulation(&mut sim, &operator, &mut rx, &mut callback)
            .await
            .unwrap();
        stopper.await.unwrap();

        assert!(result.total_ticks > 0);
        assert_eq!(callback.last_tick, result.total_ticks);
        assert!(callback.snapshots > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn not_started_means_no_ticks_but_commands_apply() {
        let (mut sim, _sink) = simulation();
        let operator = Arc::new(OperatorState::new(100, false));
        let (handle, mut rx) = SimulationHandle::channel(8);
        let driver = {
            let operator = Arc::clone(&operator);
            tokio::spawn(async move {
                let event = handle.set_world_event(String::from("A storm rolls in")).await;
                operator.request_stop();
                event
            })
        };

        let result = run_simulation(&mut sim, &operator, &mut rx, &mut NoOpCallback)
            .await
            .unwrap();
        let event = driver.await.unwrap().unwrap();

        assert_eq!(result.total_ticks, 0);
        assert_eq!(event.description, "A storm rolls in");
        assert_eq!(sim.context().world_event.as_ref(), Some(&event));
    }

    #[tokio::test(start_paused = true)]
    async fn clock_overflow_still_runs_final_flush() {
        let (mut sim, sink) = simulation();
        sim.context_mut().sync.push_encounter_step(EncounterStep {
            card_id: CardId::new(),
            step_type: StepType::Encounter,
            agent_name: None,
            message: String::from("Mira and Tomas crossed paths"),
            ts: Utc::now(),
        });
        sim.context_mut().clock.set_tick(u64::MAX);
        let operator = Arc::new(OperatorState::new(100, true));
        let (_handle, mut rx) = SimulationHandle::channel(8);

        let err = run_simulation(&mut sim, &operator, &mut rx, &mut NoOpCallback)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Clock {
                source: ClockError::TickOverflow,
                final_flush: FlushOutcome::Flushed { records: 1 },
            }
        ));
        assert_eq!(sink.batches().len(), 1);
        assert!(sim.context().sync.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn control_changes_alone_publish_no_snapshot() {
        let (mut sim, _sink) = simulation();
        let operator = Arc::new(OperatorState::new(100, false));
        let (_handle, mut rx) = SimulationHandle::channel(8);
        let driver = {
            let operator = Arc::clone(&operator);
            tokio::spawn(async move {
                operator.pause();
                tokio::task::yield_now().await;
                operator.resume();
                tokio::task::yield_now().await;
                operator.set_tick_interval_ms(200);
                tokio::task::yield_now().await;
                operator.request_stop();
            })
        };

        let mut callback = CountingCallback {
            snapshots: 0,
            last_tick: 0,
        };
        let result = run_simulation(&mut sim, &operator, &mut rx, &mut callback)
            .await
            .unwrap();
        driver.await.unwrap();

        assert_eq!(result.total_ticks, 0);
        assert_eq!(callback.snapshots, 1);
    }
}

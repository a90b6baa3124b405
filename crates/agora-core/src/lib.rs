//! Scheduler, encounters, conversations, and write-behind sync for Agora.
//!
//! This crate owns the simulation itself: agents wander a bounded plane,
//! meet, both decide whether to talk, hold a strictly alternating
//! conversation, and remember it afterwards. Every durable fact is queued
//! for a periodic, non-blocking flush to a persistence sink.
//!
//! # Modules
//!
//! - [`chat`] -- Private user-to-agent chat.
//! - [`clock`] -- Tick counter and simulated time.
//! - [`command`] -- Operator commands and the [`SimulationHandle`].
//! - [`config`] -- Configuration loading from `agora-config.yaml` into
//!   strongly-typed structs.
//! - [`context`] -- The single mutable simulation state.
//! - [`decision`] -- Bilateral consent after an encounter.
//! - [`encounter`] -- Proximity detection with per-pair cooldown.
//! - [`memory`] -- Conversation summaries written into agent memory.
//! - [`movement`] -- Per-tick movement toward targets.
//! - [`operator`] -- Shared start/pause/speed/stop controls.
//! - [`reasoner`] -- [`Reasoner`] trait and [`ScriptedReasoner`].
//! - [`runner`] -- The real-time loop around the scheduler.
//! - [`scheduler`] -- The tick cycle and in-flight work.
//! - [`session`] -- The turn-based conversation state machine.
//! - [`snapshot`] -- Read-only state for observers.
//! - [`sync`] -- [`SyncQueue`] and the [`PersistenceSink`] trait.
//! - [`world_event`] -- Global events broadcast into conversations.
//!
//! [`SimulationHandle`]: command::SimulationHandle
//! [`Reasoner`]: reasoner::Reasoner
//! [`ScriptedReasoner`]: reasoner::ScriptedReasoner
//! [`SyncQueue`]: sync::SyncQueue
//! [`PersistenceSink`]: sync::PersistenceSink

pub mod chat;
pub mod clock;
pub mod command;
pub mod config;
pub mod context;
pub mod decision;
pub mod encounter;
pub mod memory;
pub mod movement;
pub mod operator;
pub mod reasoner;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod world_event;

pub use command::{ChatReply, Command, CommandError, SimulationHandle};
pub use config::SimulationConfig;
pub use context::SimulationContext;
pub use operator::{OperatorState, OperatorStatus};
pub use reasoner::{ReasonError, Reasoner, ScriptedReasoner};
pub use runner::{NoOpCallback, SimulationResult, SnapshotCallback, run_simulation};
pub use scheduler::Simulation;
pub use snapshot::SimulationSnapshot;
pub use sync::{FlushOutcome, MemorySink, PersistError, PersistenceSink, SyncQueue};

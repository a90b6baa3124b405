//! Read-only view of the simulation for observers.

use agora_types::{Agent, Conversation, WorldEvent};
use serde::{Deserialize, Serialize};

use crate::sync::QueueDepths;

/// A point-in-time copy of everything an observer may read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    /// Ticks run so far.
    pub tick: u64,
    /// Simulated milliseconds elapsed.
    pub sim_time_ms: u64,
    /// Every agent, in roster order.
    pub agents: Vec<Agent>,
    /// Live conversations, oldest id first.
    pub conversations: Vec<Conversation>,
    /// The current world event, if any.
    pub world_event: Option<WorldEvent>,
    /// Records waiting to be persisted.
    pub queue: QueueDepths,
    /// Whether a flush is in flight.
    pub flush_in_flight: bool,
}

//! The simulation context: every piece of mutable world state in one place.
//!
//! The scheduler owns exactly one [`SimulationContext`] and passes it by
//! `&mut` to each component in turn. Nothing else holds a reference to the
//! agent or conversation tables, so there is a single writer by
//! construction.

use std::collections::BTreeMap;

use agora_types::{
    Agent, AgentId, ChatLine, Conversation, ConversationId, Position, SessionId, WorldEvent,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{ClockError, WorldClock};
use crate::config::{ConfigError, SimulationConfig};
use crate::encounter::CooldownTable;
use crate::sync::SyncQueue;

/// Errors that can occur while building the context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The clock rejected the tick interval.
    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// One private chat session between a user and an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    /// The agent being chatted with.
    pub agent_id: AgentId,
    /// The most recent lines, oldest first, capped at the chat window.
    pub lines: Vec<ChatLine>,
}

/// All mutable simulation state.
#[derive(Debug)]
pub struct SimulationContext {
    /// Validated configuration.
    pub config: SimulationConfig,
    /// Simulated time.
    pub clock: WorldClock,
    /// The fixed roster, in roster order.
    pub agents: Vec<Agent>,
    /// Live conversations.
    pub conversations: BTreeMap<ConversationId, Conversation>,
    /// Last encounter check per agent pair.
    pub cooldowns: CooldownTable,
    /// The current world event, if any.
    pub world_event: Option<WorldEvent>,
    /// Write-behind record buffers.
    pub sync: SyncQueue,
    /// Private chat sessions.
    pub chats: BTreeMap<SessionId, ChatSession>,
    /// Seeded source of spawn points and wander targets.
    pub rng: StdRng,
}

impl SimulationContext {
    /// Build the world: validate config and spawn the roster at random
    /// positions, each wandering toward a random target.
    pub fn new(config: SimulationConfig, epoch: DateTime<Utc>) -> Result<Self, ContextError> {
        config.validate()?;
        let clock = WorldClock::new(config.world.tick_interval_ms, epoch)?;
        let mut rng = StdRng::seed_from_u64(config.world.seed);
        let (width, height) = (config.world.width, config.world.height);

        let agents = config
            .roster
            .iter()
            .map(|entry| {
                let position = random_position(&mut rng, width, height);
                let target = random_position(&mut rng, width, height);
                Agent::new(
                    AgentId::for_roster_name(&entry.name),
                    entry.name.clone(),
                    entry.background.clone(),
                    entry.avatar.clone(),
                    position,
                    target,
                )
            })
            .collect();

        let sync = SyncQueue::new(config.sync.backlog_warn_threshold);
        Ok(Self {
            config,
            clock,
            agents,
            conversations: BTreeMap::new(),
            cooldowns: CooldownTable::default(),
            world_event: None,
            sync,
            chats: BTreeMap::new(),
            rng,
        })
    }

    /// Look up an agent by id.
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Look up an agent by id, mutably.
    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    /// Look up an agent by display name.
    pub fn agent_by_name(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Display name of an agent, or its id if unknown.
    pub fn agent_name(&self, id: AgentId) -> String {
        self.agent(id)
            .map_or_else(|| id.to_string(), |a| a.name.clone())
    }

    /// A uniformly random point inside the world.
    pub fn random_position(&mut self) -> Position {
        random_position(&mut self.rng, self.config.world.width, self.config.world.height)
    }

    /// Current simulated time in milliseconds.
    pub const fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Wall-clock timestamp for records produced now.
    pub fn wall_now(&self) -> DateTime<Utc> {
        self.clock.wall_now()
    }

    /// Description of the current world event, for prompts.
    pub fn world_event_text(&self) -> Option<String> {
        self.world_event.as_ref().map(|e| e.description.clone())
    }

    /// The agent's most recent memories, sized for a prompt.
    pub fn prompt_memories(&self, agent: &Agent) -> Vec<String> {
        agent
            .recent_memory(self.config.conversation.memory_prompt_window)
            .to_vec()
    }

    /// Every violated state invariant, described. Empty when consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let max_turns = self.config.conversation.max_turns;

        for agent in &self.agents {
            if !agent.is_consistent() {
                violations.push(format!(
                    "{} is {} with conversation {:?}",
                    agent.name,
                    agent.state.as_str(),
                    agent.conversation_id
                ));
            }
        }
        for conversation in self.conversations.values() {
            if conversation.turn_count > max_turns {
                violations.push(format!(
                    "conversation {} has {} turns (max {max_turns})",
                    conversation.id, conversation.turn_count
                ));
            }
            if !conversation.has_participant(conversation.turn) {
                violations.push(format!(
                    "conversation {} gives the turn to a non-participant",
                    conversation.id
                ));
            }
        }
        violations
    }
}

/// A uniformly random point in `[0, width) x [0, height)`.
pub fn random_position(rng: &mut StdRng, width: f64, height: f64) -> Position {
    Position::new(rng.random_range(0.0..width), rng.random_range(0.0..height))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agora_types::AgentState;

    use super::*;

    #[test]
    fn roster_spawns_inside_world() {
        let ctx = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        assert_eq!(ctx.agents.len(), 5);
        for agent in &ctx.agents {
            assert_eq!(agent.state, AgentState::Wandering);
            assert!(agent.position.x >= 0.0 && agent.position.x < 600.0);
            assert!(agent.position.y >= 0.0 && agent.position.y < 400.0);
        }
        assert!(ctx.invariant_violations().is_empty());
    }

    #[test]
    fn same_seed_same_world() {
        let a = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        let b = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        let positions = |ctx: &SimulationContext| -> Vec<Position> {
            ctx.agents.iter().map(|a| a.position).collect()
        };
        assert_eq!(positions(&a), positions(&b));
        let ids = |ctx: &SimulationContext| -> Vec<AgentId> {
            ctx.agents.iter().map(|a| a.id).collect()
        };
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn agent_ids_survive_a_reseed() {
        let first = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        let mut config = SimulationConfig::default();
        config.world.seed = 7;
        let second = SimulationContext::new(config, Utc::now()).unwrap();
        for (a, b) in first.agents.iter().zip(&second.agents) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.id, AgentId::for_roster_name(&a.name));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SimulationConfig::default();
        config.roster.truncate(1);
        assert!(matches!(
            SimulationContext::new(config, Utc::now()),
            Err(ContextError::Config(_))
        ));
    }

    #[test]
    fn lookups_by_id_and_name() {
        let ctx = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        let mira = ctx.agent_by_name("Mira").unwrap();
        assert_eq!(ctx.agent(mira.id).unwrap().name, "Mira");
        assert_eq!(ctx.agent_name(mira.id), "Mira");
        assert!(ctx.agent_by_name("Nobody").is_none());
    }
}

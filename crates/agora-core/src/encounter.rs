//! Pairwise encounter detection with a symmetric cooldown.
//!
//! Two agents encounter each other when both are free, they are closer than
//! the encounter distance, and their pair has not been checked within the
//! cooldown window. Firing stamps the pair immediately, so neither the same
//! scan nor the next few ticks can fire it again.

use std::collections::{BTreeMap, BTreeSet};

use agora_types::AgentId;
use tracing::debug;

use crate::context::SimulationContext;

/// Last encounter check per unordered agent pair, in simulated ms.
///
/// The key is the two ids in ascending order, so `(a, b)` and `(b, a)`
/// share one entry. A missing entry means the pair was never checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownTable {
    last_check: BTreeMap<(AgentId, AgentId), u64>,
}

impl CooldownTable {
    /// When the pair was last checked, if ever.
    pub fn last_check(&self, a: AgentId, b: AgentId) -> Option<u64> {
        self.last_check.get(&pair_key(a, b)).copied()
    }

    /// Record a check of the pair at `now_ms`.
    pub fn stamp(&mut self, a: AgentId, b: AgentId, now_ms: u64) {
        self.last_check.insert(pair_key(a, b), now_ms);
    }

    /// Whether more than `cooldown_ms` has passed since the last check.
    pub fn is_ready(&self, a: AgentId, b: AgentId, now_ms: u64, cooldown_ms: u64) -> bool {
        self.last_check(a, b)
            .is_none_or(|last| now_ms.saturating_sub(last) > cooldown_ms)
    }
}

fn pair_key(a: AgentId, b: AgentId) -> (AgentId, AgentId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Two agents that just ran into each other.
///
/// `first` precedes `second` in roster order and speaks first if a
/// conversation follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encounter {
    /// Earlier agent in roster order.
    pub first: AgentId,
    /// Later agent in roster order.
    pub second: AgentId,
}

/// Find and stamp this tick's encounters.
///
/// Pairs are scanned in roster order. An agent takes part in at most one
/// encounter per scan.
pub fn detect_encounters(ctx: &mut SimulationContext) -> Vec<Encounter> {
    let now = ctx.now_ms();
    let distance = ctx.config.encounter.distance;
    let cooldown = ctx.config.encounter.cooldown_ms;
    let mut paired = BTreeSet::new();
    let mut encounters = Vec::new();

    for (i, a) in ctx.agents.iter().enumerate() {
        for b in ctx.agents.iter().skip(i.saturating_add(1)) {
            if !(a.state.is_free() && b.state.is_free()) {
                continue;
            }
            if paired.contains(&a.id) || paired.contains(&b.id) {
                continue;
            }
            if a.position.distance_to(b.position) >= distance {
                continue;
            }
            if !ctx.cooldowns.is_ready(a.id, b.id, now, cooldown) {
                continue;
            }
            ctx.cooldowns.stamp(a.id, b.id, now);
            paired.insert(a.id);
            paired.insert(b.id);
            debug!(first = %a.name, second = %b.name, "encounter detected");
            encounters.push(Encounter {
                first: a.id,
                second: b.id,
            });
        }
    }
    encounters
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agora_types::{ConversationId, Position};
    use chrono::Utc;

    use super::*;
    use crate::config::SimulationConfig;

    /// Three agents: the first two five units apart, the third far away.
    fn context() -> SimulationContext {
        let mut config = SimulationConfig::default();
        config.roster.truncate(3);
        let mut ctx = SimulationContext::new(config, Utc::now()).unwrap();
        let spots = [
            Position::new(0.0, 0.0),
            Position::new(3.0, 4.0),
            Position::new(500.0, 300.0),
        ];
        for (agent, spot) in ctx.agents.iter_mut().zip(spots) {
            agent.position = spot;
            agent.target = spot;
        }
        ctx
    }

    #[test]
    fn close_free_pair_fires_once_per_window() {
        let mut ctx = context();
        let encounters = detect_encounters(&mut ctx);
        assert_eq!(encounters.len(), 1);
        let first = ctx.agents.first().unwrap().id;
        assert_eq!(encounters.first().unwrap().first, first);

        // Same instant and inside the window: cooled down.
        assert!(detect_encounters(&mut ctx).is_empty());
        for _ in 0..100 {
            ctx.clock.advance().unwrap();
        }
        assert_eq!(ctx.now_ms(), 10_000);
        assert!(detect_encounters(&mut ctx).is_empty());

        ctx.clock.advance().unwrap();
        assert_eq!(detect_encounters(&mut ctx).len(), 1);
    }

    #[test]
    fn engaged_agents_are_skipped() {
        let mut ctx = context();
        ctx.agents
            .get_mut(1)
            .unwrap()
            .begin_thinking(ConversationId::new());
        assert!(detect_encounters(&mut ctx).is_empty());
        let a = ctx.agents.first().unwrap().id;
        let b = ctx.agents.get(1).unwrap().id;
        assert_eq!(ctx.cooldowns.last_check(a, b), None);
    }

    #[test]
    fn an_agent_joins_at_most_one_encounter_per_scan() {
        let mut ctx = context();
        ctx.agents.get_mut(2).unwrap().position = Position::new(1.0, 1.0);
        let encounters = detect_encounters(&mut ctx);
        assert_eq!(encounters.len(), 1);
    }

    #[test]
    fn cooldown_is_symmetric() {
        let mut table = CooldownTable::default();
        let a = AgentId::new();
        let b = AgentId::new();
        table.stamp(b, a, 500);
        assert_eq!(table.last_check(a, b), Some(500));
        assert!(!table.is_ready(a, b, 1_000, 10_000));
        assert!(table.is_ready(a, b, 10_501, 10_000));
    }
}

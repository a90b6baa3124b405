//! Bilateral consent: both agents must want to talk.
//!
//! [`begin`] puts the pair into `thinking` and builds one prompt context per
//! agent. The scheduler issues both reasoner calls concurrently and hands
//! the joined results to [`resolve`], which starts a conversation only if
//! both agents said yes. A failed call counts as a refusal.

use agora_types::{
    AgentId, AgentState, CardId, ConversationId, DecisionContext, EncounterStep, StepType,
    TalkDecision,
};
use tracing::{info, warn};

use crate::context::SimulationContext;
use crate::encounter::Encounter;
use crate::reasoner::ReasonError;
use crate::session;

/// An encounter waiting on both decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDecision {
    /// The pair, in roster order.
    pub encounter: Encounter,
    /// Card grouping this encounter's lifecycle steps.
    pub card_id: CardId,
    /// Id the conversation will get if both agents agree.
    pub conversation_id: ConversationId,
}

/// How a pending decision was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Both agents agreed; the conversation is live.
    Started(ConversationId),
    /// At least one agent refused; both are wandering again.
    Declined,
    /// The pair was no longer waiting on this decision. Nothing changed.
    Stale,
}

/// Put both agents into `thinking` and build their prompt contexts.
///
/// Returns `None` if either agent is unknown or no longer free.
pub fn begin(
    ctx: &mut SimulationContext,
    encounter: Encounter,
) -> Option<(PendingDecision, DecisionContext, DecisionContext)> {
    let first_ctx = decision_context(ctx, encounter.first, encounter.second)?;
    let second_ctx = decision_context(ctx, encounter.second, encounter.first)?;
    let pair_free = [encounter.first, encounter.second]
        .iter()
        .all(|id| ctx.agent(*id).is_some_and(|a| a.state.is_free()));
    if !pair_free {
        return None;
    }

    let pending = PendingDecision {
        encounter,
        card_id: CardId::new(),
        conversation_id: ConversationId::new(),
    };
    for id in [encounter.first, encounter.second] {
        if let Some(agent) = ctx.agent_mut(id) {
            agent.begin_thinking(pending.conversation_id);
        }
    }

    let ts = ctx.wall_now();
    ctx.sync.push_encounter_step(EncounterStep {
        card_id: pending.card_id,
        step_type: StepType::Encounter,
        agent_name: None,
        message: format!("{} ran into {}", first_ctx.agent_name, second_ctx.agent_name),
        ts,
    });
    info!(
        first = %first_ctx.agent_name,
        second = %second_ctx.agent_name,
        card_id = %pending.card_id,
        "encounter, asking both agents"
    );
    Some((pending, first_ctx, second_ctx))
}

/// Settle a pending decision from both reasoner results.
pub fn resolve(
    ctx: &mut SimulationContext,
    pending: PendingDecision,
    first: Result<TalkDecision, ReasonError>,
    second: Result<TalkDecision, ReasonError>,
) -> DecisionOutcome {
    let pair = [pending.encounter.first, pending.encounter.second];
    let is_waiting = |ctx: &SimulationContext, id: AgentId| {
        ctx.agent(id).is_some_and(|a| {
            a.state == AgentState::Thinking && a.conversation_id == Some(pending.conversation_id)
        })
    };
    if !pair.iter().all(|id| is_waiting(ctx, *id)) {
        // Release whichever side is still stuck waiting.
        for id in pair {
            if is_waiting(ctx, id) {
                let target = ctx.random_position();
                if let Some(agent) = ctx.agent_mut(id) {
                    agent.wander(target);
                }
            }
        }
        warn!(card_id = %pending.card_id, "decision arrived for a pair no longer waiting, dropped");
        return DecisionOutcome::Stale;
    }

    let first = record_decision(ctx, pending, pending.encounter.first, first);
    let second = record_decision(ctx, pending, pending.encounter.second, second);

    if first.should_initiate && second.should_initiate {
        session::start(ctx, pending);
        DecisionOutcome::Started(pending.conversation_id)
    } else {
        for id in [pending.encounter.first, pending.encounter.second] {
            let target = ctx.random_position();
            if let Some(agent) = ctx.agent_mut(id) {
                agent.wander(target);
            }
        }
        info!(card_id = %pending.card_id, "encounter declined");
        DecisionOutcome::Declined
    }
}

/// Apply the fail-safe default, log, and queue the decision step.
fn record_decision(
    ctx: &mut SimulationContext,
    pending: PendingDecision,
    agent_id: AgentId,
    result: Result<TalkDecision, ReasonError>,
) -> TalkDecision {
    let name = ctx.agent_name(agent_id);
    let decision = result.unwrap_or_else(|err| {
        warn!(agent = %name, error = %err, "decision failed, treating as refusal");
        TalkDecision::decline(format!("AI decision error: {err}"))
    });
    info!(
        agent = %name,
        should_initiate = decision.should_initiate,
        reason = %decision.reason,
        "decision"
    );

    let verb = if decision.should_initiate {
        "wants to talk"
    } else {
        "does not want to talk"
    };
    let ts = ctx.wall_now();
    ctx.sync.push_encounter_step(EncounterStep {
        card_id: pending.card_id,
        step_type: StepType::Decision,
        agent_name: Some(name.clone()),
        message: format!("{name} {verb}: {}", decision.reason),
        ts,
    });
    decision
}

fn decision_context(
    ctx: &SimulationContext,
    agent_id: AgentId,
    other_id: AgentId,
) -> Option<DecisionContext> {
    let agent = ctx.agent(agent_id)?;
    let other = ctx.agent(other_id)?;
    Some(DecisionContext {
        agent_name: agent.name.clone(),
        background: agent.background.clone(),
        memories: ctx.prompt_memories(agent),
        motivation: agent.motivation.clone(),
        world_event: ctx.world_event_text(),
        other_name: other.name.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agora_types::StepType;
    use chrono::Utc;

    use super::*;
    use crate::config::SimulationConfig;

    fn setup() -> (SimulationContext, Encounter) {
        let ctx = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        let encounter = Encounter {
            first: ctx.agents.first().unwrap().id,
            second: ctx.agents.get(1).unwrap().id,
        };
        (ctx, encounter)
    }

    fn yes() -> Result<TalkDecision, ReasonError> {
        Ok(TalkDecision {
            should_initiate: true,
            reason: String::from("sure"),
        })
    }

    #[test]
    fn begin_moves_pair_to_thinking() {
        let (mut ctx, encounter) = setup();
        let (pending, first, second) = begin(&mut ctx, encounter).unwrap();
        assert_eq!(first.other_name, second.agent_name);
        for id in [encounter.first, encounter.second] {
            let agent = ctx.agent(id).unwrap();
            assert_eq!(agent.state, AgentState::Thinking);
            assert_eq!(agent.conversation_id, Some(pending.conversation_id));
        }
        let steps = ctx.sync.encounter_steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps.first().unwrap().step_type, StepType::Encounter);
        assert!(ctx.invariant_violations().is_empty());
    }

    #[test]
    fn failed_call_counts_as_refusal() {
        let (mut ctx, encounter) = setup();
        let (pending, _, _) = begin(&mut ctx, encounter).unwrap();
        let outcome = resolve(&mut ctx, pending, yes(), Err(ReasonError::internal("boom")));
        assert_eq!(outcome, DecisionOutcome::Declined);
        assert!(ctx.conversations.is_empty());
        let refusal = ctx.sync.encounter_steps().last().unwrap();
        assert!(refusal.message.contains("AI decision error"));
    }

    #[test]
    fn mutual_consent_starts_conversation() {
        let (mut ctx, encounter) = setup();
        let (pending, _, _) = begin(&mut ctx, encounter).unwrap();
        let outcome = resolve(&mut ctx, pending, yes(), yes());
        assert_eq!(outcome, DecisionOutcome::Started(pending.conversation_id));
        let conversation = ctx.conversations.get(&pending.conversation_id).unwrap();
        assert_eq!(conversation.turn, encounter.first);
        assert_eq!(conversation.card_id, Some(pending.card_id));
    }

    #[test]
    fn stale_decision_is_dropped() {
        let (mut ctx, encounter) = setup();
        let (pending, _, _) = begin(&mut ctx, encounter).unwrap();
        let target = ctx.random_position();
        ctx.agent_mut(encounter.first).unwrap().wander(target);
        assert_eq!(resolve(&mut ctx, pending, yes(), yes()), DecisionOutcome::Stale);
        assert!(ctx.conversations.is_empty());
        assert_eq!(ctx.agent(encounter.second).unwrap().state, AgentState::Wandering);
        assert!(ctx.invariant_violations().is_empty());
    }
}

//! The conversation state machine.
//!
//! A conversation is `active` from [`start`] until [`terminate`], which is
//! the single exit path and removes it from the live table. In between,
//! the scheduler repeats a turn step: [`prepare_turn`] guards and builds the
//! speaker's prompt, the reasoner answers, and [`apply_turn`] records the
//! line and either hands the turn over or ends the conversation.
//!
//! Every continuation re-checks that its conversation is still live and
//! still waiting on the same speaker. A result for a conversation that has
//! moved on is dropped as a no-op.

use agora_types::{
    AgentId, AgentState, CardId, Conversation, ConversationId, ConversationInit,
    ConversationMessage, EncounterStep, HistoryEntry, SenderType, SpeakerAction, StepType,
    TurnContext, TurnReply,
};
use tracing::{debug, info, warn};

use crate::context::SimulationContext;
use crate::decision::PendingDecision;
use crate::reasoner::ReasonError;

/// Line spoken when the reasoner fails mid-conversation.
pub const FALLBACK_UTTERANCE: &str = "Sorry, I lost my train of thought. Let's talk later.";

/// Termination reason when the turn limit is hit.
pub const MAX_TURNS_REASON: &str = "max turns reached";

/// Identifies the turn a reasoner call was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTicket {
    /// The conversation.
    pub conversation_id: ConversationId,
    /// Who was asked to speak.
    pub speaker: AgentId,
    /// Turns taken when the call was issued.
    pub turn_count: u32,
}

/// What the scheduler should do for a conversation's next step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPlan {
    /// Ask the reasoner for this turn.
    Ask(TurnTicket, TurnContext),
    /// A guard ended the conversation.
    Ended(Termination),
}

/// What happened when a turn result was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The conversation continues; the next step is due at `due_ms`.
    Continue {
        /// Simulated time the next turn may run.
        due_ms: u64,
    },
    /// The speaker left.
    Ended(Termination),
    /// The conversation had moved on. Nothing changed.
    Dropped,
}

/// Everything left of a conversation once it has been removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// The conversation that ended.
    pub conversation_id: ConversationId,
    /// Participants, initiator first.
    pub participants: [AgentId; 2],
    /// The full history, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Why it ended.
    pub reason: String,
}

/// Create the conversation for an agreed encounter.
///
/// Both agents start talking and stop where they are. The first agent of
/// the pair speaks first.
pub fn start(ctx: &mut SimulationContext, pending: PendingDecision) -> ConversationId {
    let id = pending.conversation_id;
    let (first, second) = (pending.encounter.first, pending.encounter.second);
    let created_at = ctx.wall_now();
    let conversation = Conversation::new(id, first, second, Some(pending.card_id), created_at);
    ctx.conversations.insert(id, conversation);
    for agent_id in [first, second] {
        if let Some(agent) = ctx.agent_mut(agent_id) {
            agent.begin_talking(id);
        }
    }

    let (first_name, second_name) = (ctx.agent_name(first), ctx.agent_name(second));
    ctx.sync.push_conversation_init(ConversationInit {
        conversation_id: id,
        participant_agent_ids: vec![first, second],
        card_id: Some(pending.card_id),
        created_at,
    });
    push_step(
        ctx,
        Some(pending.card_id),
        StepType::ConversationStart,
        None,
        format!("{first_name} and {second_name} started talking"),
    );
    info!(
        conversation_id = %id,
        first = %first_name,
        second = %second_name,
        "conversation started"
    );
    id
}

/// Guard the next turn and build the speaker's prompt.
///
/// Returns `None` if the conversation is no longer live.
pub fn prepare_turn(ctx: &mut SimulationContext, id: ConversationId) -> Option<TurnPlan> {
    let max_turns = ctx.config.conversation.max_turns;
    let conversation = ctx.conversations.get(&id)?;

    if conversation.turn_count >= max_turns {
        return terminate(ctx, id, MAX_TURNS_REASON, None).map(TurnPlan::Ended);
    }

    let speaker_id = conversation.turn;
    let speaker = ctx
        .agent(speaker_id)
        .filter(|a| a.state == AgentState::Talking && a.conversation_id == Some(id));
    let Some(speaker) = speaker else {
        warn!(conversation_id = %id, speaker = %speaker_id, "speaker missing or not talking");
        let reason = format!("speaker {speaker_id} is not available");
        return terminate(ctx, id, &reason, None).map(TurnPlan::Ended);
    };

    let other_name = conversation
        .other(speaker_id)
        .map(|other| ctx.agent_name(other))
        .unwrap_or_default();
    let known_agents = ctx
        .agents
        .iter()
        .filter(|a| a.id != speaker_id)
        .map(|a| a.name.clone())
        .collect();
    let ticket = TurnTicket {
        conversation_id: id,
        speaker: speaker_id,
        turn_count: conversation.turn_count,
    };
    let turn_ctx = TurnContext {
        speaker_name: speaker.name.clone(),
        background: speaker.background.clone(),
        memories: ctx.prompt_memories(speaker),
        other_name,
        world_event: ctx.world_event_text(),
        history: conversation.history.clone(),
        turn_count: conversation.turn_count,
        max_turns,
        known_agents,
    };
    Some(TurnPlan::Ask(ticket, turn_ctx))
}

/// Record a turn result and decide what comes next.
pub fn apply_turn(
    ctx: &mut SimulationContext,
    ticket: TurnTicket,
    reply: Result<TurnReply, ReasonError>,
) -> TurnOutcome {
    let id = ticket.conversation_id;
    let live = ctx
        .conversations
        .get(&id)
        .is_some_and(|c| c.turn == ticket.speaker && c.turn_count == ticket.turn_count);
    if !live {
        debug!(conversation_id = %id, "turn result for a conversation that moved on, dropped");
        return TurnOutcome::Dropped;
    }

    let speaker_name = ctx.agent_name(ticket.speaker);
    let reply = reply.unwrap_or_else(|err| {
        warn!(
            conversation_id = %id,
            speaker = %speaker_name,
            error = %err,
            "turn failed, speaker leaves"
        );
        TurnReply {
            dialogue: String::from(FALLBACK_UTTERANCE),
            action: SpeakerAction::LeaveAndWander,
        }
    });

    let Some(conversation) = ctx.conversations.get_mut(&id) else {
        return TurnOutcome::Dropped;
    };
    let turn_index = conversation.record_turn(speaker_name.clone(), reply.dialogue.clone());
    let card_id = conversation.card_id;
    let continuing = !reply.action.ends_conversation();
    if continuing {
        conversation.flip_turn();
    }

    let now = ctx.now_ms();
    let ts = ctx.wall_now();
    ctx.sync.push_conversation_message(ConversationMessage {
        conversation_id: id,
        turn_index,
        sender_agent_id: Some(ticket.speaker),
        sender_type: SenderType::Agent,
        content: reply.dialogue.clone(),
        ts,
    });
    push_step(
        ctx,
        card_id,
        StepType::Dialogue,
        Some(speaker_name.clone()),
        reply.dialogue.clone(),
    );
    if let Some(speaker) = ctx.agent_mut(ticket.speaker) {
        speaker.say(reply.dialogue.clone(), now);
    }
    debug!(conversation_id = %id, speaker = %speaker_name, line = %reply.dialogue, "turn");

    if continuing {
        let due_ms = now.saturating_add(ctx.config.conversation.turn_delay_ms);
        return TurnOutcome::Continue { due_ms };
    }
    let reason = format!("{speaker_name} decided to end");
    terminate(ctx, id, &reason, Some((ticket.speaker, reply.action)))
        .map_or(TurnOutcome::Dropped, TurnOutcome::Ended)
}

/// End a live conversation and route both participants.
///
/// With a speaker action, the speaker follows it and the other participant
/// wanders. Without one, both wander. Returns `None` if the conversation
/// was not live.
pub fn terminate(
    ctx: &mut SimulationContext,
    id: ConversationId,
    reason: &str,
    speaker_action: Option<(AgentId, SpeakerAction)>,
) -> Option<Termination> {
    let conversation = ctx.conversations.remove(&id)?;
    let [first, second] = conversation.participants;

    let (speaker, action) = match speaker_action {
        Some((speaker, action)) if conversation.has_participant(speaker) => (Some(speaker), action),
        _ => (None, SpeakerAction::LeaveAndWander),
    };

    for agent_id in [first, second] {
        // Only an agent still bound to this conversation is routed.
        let bound = ctx
            .agent(agent_id)
            .is_some_and(|a| a.conversation_id == Some(id));
        if !bound {
            continue;
        }
        if speaker == Some(agent_id) {
            route_speaker(ctx, agent_id, &action);
        } else {
            let target = ctx.random_position();
            if let Some(agent) = ctx.agent_mut(agent_id) {
                agent.wander(target);
            }
        }
    }

    push_step(
        ctx,
        conversation.card_id,
        StepType::ConversationEnd,
        None,
        format!("Conversation ended: {reason}"),
    );
    info!(
        conversation_id = %id,
        turns = conversation.turn_count,
        reason,
        "conversation ended"
    );
    Some(Termination {
        conversation_id: id,
        participants: conversation.participants,
        history: conversation.history,
        reason: reason.to_owned(),
    })
}

/// Operator reset: end a live conversation with no speaker action.
pub fn reset_conversation(ctx: &mut SimulationContext, id: ConversationId) -> Option<Termination> {
    terminate(ctx, id, "reset by operator", None)
}

/// Send the leaving speaker wandering or looking for someone.
fn route_speaker(ctx: &mut SimulationContext, speaker: AgentId, action: &SpeakerAction) {
    let found = match action {
        SpeakerAction::LeaveAndFind { target_name } => ctx
            .agent_by_name(target_name)
            .filter(|target| target.id != speaker)
            .map(|target| (target.name.clone(), target.position)),
        SpeakerAction::ContinueTalking | SpeakerAction::LeaveAndWander => None,
    };

    if let Some((name, position)) = found {
        if let Some(agent) = ctx.agent_mut(speaker) {
            info!(agent = %agent.name, looking_for = %name, "leaving to find someone");
            agent.find(name, position);
        }
        return;
    }
    if let SpeakerAction::LeaveAndFind { target_name } = action {
        debug!(target = %target_name, "find target unknown, wandering instead");
    }
    let target = ctx.random_position();
    if let Some(agent) = ctx.agent_mut(speaker) {
        agent.wander(target);
    }
}

fn push_step(
    ctx: &mut SimulationContext,
    card_id: Option<CardId>,
    step_type: StepType,
    agent_name: Option<String>,
    message: String,
) {
    let Some(card_id) = card_id else {
        return;
    };
    let ts = ctx.wall_now();
    ctx.sync.push_encounter_step(EncounterStep {
        card_id,
        step_type,
        agent_name,
        message,
        ts,
    });
}

//! The global world event.
//!
//! Setting an event only affects prompts built from then on. Every live
//! conversation also gets a `World` notice in its history (not a turn) and
//! both participants see it as a bubble.

use agora_types::{ConversationMessage, EventId, SenderType, WorldEvent};
use tracing::info;

use crate::command::CommandError;
use crate::context::SimulationContext;

/// Longest accepted description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Speaker name of world notices.
pub const WORLD_SPEAKER: &str = "World";

/// Set the current world event and broadcast it to live conversations.
pub fn set(ctx: &mut SimulationContext, description: &str) -> Result<WorldEvent, CommandError> {
    let description: String = description.trim().chars().take(MAX_DESCRIPTION_CHARS).collect();
    if description.is_empty() {
        return Err(CommandError::BlankInput);
    }

    let event = WorldEvent {
        id: EventId::new(),
        description,
        created_at: ctx.wall_now(),
    };
    ctx.world_event = Some(event.clone());

    let notice = format!("World event: {}", event.description);
    let now = ctx.now_ms();
    let mut notified = Vec::new();
    for conversation in ctx.conversations.values_mut() {
        let turn_index = conversation.record_notice(WORLD_SPEAKER.to_owned(), notice.clone());
        ctx.sync.push_conversation_message(ConversationMessage {
            conversation_id: conversation.id,
            turn_index,
            sender_agent_id: None,
            sender_type: SenderType::System,
            content: notice.clone(),
            ts: event.created_at,
        });
        notified.extend(conversation.participants);
    }
    for agent_id in &notified {
        if let Some(agent) = ctx.agent_mut(*agent_id) {
            agent.say(notice.clone(), now);
        }
    }

    info!(
        event_id = %event.id,
        description = %event.description,
        conversations = ctx.conversations.len(),
        "world event set"
    );
    Ok(event)
}

/// Clear the current world event. Returns the event that was cleared.
pub fn clear(ctx: &mut SimulationContext) -> Option<WorldEvent> {
    let cleared = ctx.world_event.take();
    if let Some(event) = &cleared {
        info!(event_id = %event.id, "world event cleared");
    }
    cleared
}

//! Private chat between a user and one agent.
//!
//! A private chat never changes the agent's state or memory. It only shows
//! the reply as a bubble and queues both lines for persistence. A session
//! keeps only the lines its prompt window can use; the full exchange lives
//! in the persisted records.

use agora_types::{
    AgentId, ChatContext, ChatLine, ChatSender, MessageId, PrivateMessage, SessionId,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::command::{ChatReply, CommandError};
use crate::context::{ChatSession, SimulationContext};
use crate::reasoner::ReasonError;

/// Reply used when the reasoner fails.
pub const FALLBACK_REPLY: &str = "Sorry, I'm a bit busy right now, let's talk later...";

/// A chat message waiting on the agent's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingChat {
    /// The session.
    pub session_id: SessionId,
    /// The agent asked.
    pub agent_id: AgentId,
}

/// Record the user's message and build the agent's prompt.
pub fn begin(
    ctx: &mut SimulationContext,
    agent_id: AgentId,
    session_id: Option<SessionId>,
    message: &str,
) -> Result<(PendingChat, ChatContext), CommandError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(CommandError::BlankInput);
    }
    let agent = ctx.agent(agent_id).ok_or(CommandError::UnknownAgent(agent_id))?;
    let (agent_name, background) = (agent.name.clone(), agent.background.clone());
    let memories = ctx.prompt_memories(agent);
    let world_event = ctx.world_event_text();
    let window = ctx.config.conversation.private_chat_window;

    let session_id = session_id.unwrap_or_default();
    let session = ctx.chats.entry(session_id).or_insert_with(|| ChatSession {
        agent_id,
        lines: Vec::new(),
    });
    if session.agent_id != agent_id {
        return Err(CommandError::SessionMismatch(session_id));
    }
    let start = session.lines.len().saturating_sub(window);
    let recent = session.lines.get(start..).unwrap_or_default().to_vec();

    let ts = ctx.wall_now();
    push_line(ctx, session_id, agent_id, ChatSender::User, message, ts);

    let chat_ctx = ChatContext {
        agent_name,
        background,
        memories,
        world_event,
        recent,
        message: message.to_owned(),
    };
    Ok((PendingChat { session_id, agent_id }, chat_ctx))
}

/// Record the agent's reply, falling back to a canned line on failure.
pub fn finish(
    ctx: &mut SimulationContext,
    pending: PendingChat,
    result: Result<String, ReasonError>,
) -> ChatReply {
    let (reply, fallback) = match result {
        Ok(text) if !text.trim().is_empty() => (text.trim().to_owned(), false),
        Ok(_) => (String::from(FALLBACK_REPLY), true),
        Err(err) => {
            warn!(agent_id = %pending.agent_id, error = %err, "chat reply failed, using fallback");
            (String::from(FALLBACK_REPLY), true)
        }
    };

    let ts = ctx.wall_now();
    push_line(ctx, pending.session_id, pending.agent_id, ChatSender::Agent, &reply, ts);
    let now = ctx.now_ms();
    if let Some(agent) = ctx.agent_mut(pending.agent_id) {
        agent.say(reply.clone(), now);
        info!(agent = %agent.name, session_id = %pending.session_id, fallback, "private chat reply");
    }
    ChatReply {
        session_id: pending.session_id,
        reply,
        fallback,
    }
}

fn push_line(
    ctx: &mut SimulationContext,
    session_id: SessionId,
    agent_id: AgentId,
    sender: ChatSender,
    text: &str,
    ts: DateTime<Utc>,
) {
    let window = ctx.config.conversation.private_chat_window;
    if let Some(session) = ctx.chats.get_mut(&session_id) {
        session.lines.push(ChatLine {
            sender,
            message: text.to_owned(),
            timestamp: ts,
        });
        let excess = session.lines.len().saturating_sub(window);
        session.lines.drain(..excess);
    }
    let sender_agent_id = match sender {
        ChatSender::Agent => Some(agent_id),
        ChatSender::User => None,
    };
    ctx.sync.push_private_message(PrivateMessage {
        session_id,
        client_message_id: MessageId::random(),
        sender_type: sender,
        sender_agent_id,
        content: text.to_owned(),
        ts,
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    fn context() -> (SimulationContext, AgentId) {
        let ctx = SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap();
        let id = ctx.agents.first().unwrap().id;
        (ctx, id)
    }

    #[test]
    fn blank_and_unknown_are_rejected() {
        let (mut ctx, id) = context();
        assert_eq!(begin(&mut ctx, id, None, "  ").unwrap_err(), CommandError::BlankInput);
        let stranger = AgentId::new();
        assert_eq!(
            begin(&mut ctx, stranger, None, "hi").unwrap_err(),
            CommandError::UnknownAgent(stranger)
        );
        assert!(ctx.sync.is_empty());
    }

    #[test]
    fn exchange_is_recorded_without_touching_memory_or_state() {
        let (mut ctx, id) = context();
        let before = ctx.agent(id).unwrap().clone();

        let (pending, prompt) = begin(&mut ctx, id, None, " Hello! ").unwrap();
        assert_eq!(prompt.message, "Hello!");
        assert!(prompt.recent.is_empty());
        let reply = finish(&mut ctx, pending, Ok(String::from("Hi there.")));
        assert!(!reply.fallback);

        let agent = ctx.agent(id).unwrap();
        assert_eq!(agent.memory, before.memory);
        assert_eq!(agent.state, before.state);
        assert_eq!(agent.last_message.as_deref(), Some("Hi there."));

        let queued = ctx.sync.private_messages();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued.first().unwrap().sender_type, ChatSender::User);
        assert_eq!(queued.get(1).unwrap().sender_agent_id, Some(id));
    }

    #[test]
    fn failure_uses_fallback_and_history_window_applies() {
        let (mut ctx, id) = context();
        let (pending, _) = begin(&mut ctx, id, None, "one").unwrap();
        let reply = finish(&mut ctx, pending, Err(ReasonError::internal("down")));
        assert!(reply.fallback);
        assert_eq!(reply.reply, FALLBACK_REPLY);

        let session = Some(reply.session_id);
        for i in 0..4 {
            let (pending, _) = begin(&mut ctx, id, session, &format!("msg {i}")).unwrap();
            finish(&mut ctx, pending, Ok(String::from("ok")));
        }
        let (_, prompt) = begin(&mut ctx, id, session, "last").unwrap();
        assert_eq!(prompt.recent.len(), 6);
        assert_eq!(prompt.recent.last().unwrap().message, "ok");
    }

    #[test]
    fn stored_session_lines_stay_within_the_window() {
        let (mut ctx, id) = context();
        let mut session = None;
        for i in 0..20 {
            let (pending, _) = begin(&mut ctx, id, session, &format!("msg {i}")).unwrap();
            session = Some(finish(&mut ctx, pending, Ok(format!("reply {i}"))).session_id);
        }
        let lines = &ctx.chats.get(&session.unwrap()).unwrap().lines;
        assert_eq!(lines.len(), 6);
        assert_eq!(lines.first().unwrap().message, "msg 17");
        assert_eq!(lines.last().unwrap().message, "reply 19");
        assert_eq!(ctx.sync.private_messages().len(), 40);
    }

    #[test]
    fn session_is_bound_to_one_agent() {
        let (mut ctx, id) = context();
        let other = ctx.agents.get(1).unwrap().id;
        let (pending, _) = begin(&mut ctx, id, None, "hi").unwrap();
        let result = begin(&mut ctx, other, Some(pending.session_id), "hi");
        assert_eq!(result.unwrap_err(), CommandError::SessionMismatch(pending.session_id));
    }
}

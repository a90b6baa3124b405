//! Operator commands delivered to the scheduler.
//!
//! The scheduler is the only writer of simulation state, so everything the
//! operator surface wants to change travels as a [`Command`] over a channel
//! and is applied between ticks. Each command carries a oneshot sender for
//! its answer. [`SimulationHandle`] wraps the channel in plain async methods.

use agora_types::{AgentId, ConversationId, SessionId, WorldEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::sync::FlushOutcome;

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No agent has this id.
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// No live conversation has this id.
    #[error("unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// The chat session belongs to a different agent.
    #[error("chat session {0} belongs to another agent")]
    SessionMismatch(SessionId),

    /// Required text was empty after trimming.
    #[error("input must not be blank")]
    BlankInput,

    /// The scheduler is no longer accepting commands.
    #[error("simulation is not running")]
    Stopped,
}

/// A private chat answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// The session the exchange belongs to.
    pub session_id: SessionId,
    /// What the agent said.
    pub reply: String,
    /// Whether the reply is the canned fallback after a reasoner failure.
    pub fallback: bool,
}

/// A request for the scheduler.
#[derive(Debug)]
pub enum Command {
    /// Set the world event and broadcast it to live conversations.
    SetWorldEvent {
        /// Event text.
        description: String,
        /// Where to send the result.
        respond_to: oneshot::Sender<Result<WorldEvent, CommandError>>,
    },
    /// Clear the world event.
    ClearWorldEvent {
        /// Receives the cleared event, if there was one.
        respond_to: oneshot::Sender<Option<WorldEvent>>,
    },
    /// Send a private message to an agent.
    PrivateChat {
        /// The agent to talk to.
        agent_id: AgentId,
        /// Existing session to continue, or `None` to open one.
        session_id: Option<SessionId>,
        /// The user's message.
        message: String,
        /// Where to send the reply.
        respond_to: oneshot::Sender<Result<ChatReply, CommandError>>,
    },
    /// End a live conversation; both participants wander.
    ResetConversation {
        /// The conversation to end.
        conversation_id: ConversationId,
        /// Where to send the result.
        respond_to: oneshot::Sender<Result<(), CommandError>>,
    },
    /// Flush the sync queue without waiting for the timer.
    FlushNow {
        /// Receives the flush outcome once it settles.
        respond_to: oneshot::Sender<FlushOutcome>,
    },
}

/// Cloneable sender side of the command channel.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    tx: mpsc::Sender<Command>,
}

impl SimulationHandle {
    /// Create a handle and the receiver the run loop reads from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Set the world event.
    pub async fn set_world_event(&self, description: String) -> Result<WorldEvent, CommandError> {
        self.request(|respond_to| Command::SetWorldEvent {
            description,
            respond_to,
        })
        .await?
    }

    /// Clear the world event.
    pub async fn clear_world_event(&self) -> Result<Option<WorldEvent>, CommandError> {
        self.request(|respond_to| Command::ClearWorldEvent { respond_to })
            .await
    }

    /// Chat privately with an agent.
    pub async fn private_chat(
        &self,
        agent_id: AgentId,
        session_id: Option<SessionId>,
        message: String,
    ) -> Result<ChatReply, CommandError> {
        self.request(|respond_to| Command::PrivateChat {
            agent_id,
            session_id,
            message,
            respond_to,
        })
        .await?
    }

    /// End a live conversation.
    pub async fn reset_conversation(&self, conversation_id: ConversationId) -> Result<(), CommandError> {
        self.request(|respond_to| Command::ResetConversation {
            conversation_id,
            respond_to,
        })
        .await?
    }

    /// Flush the sync queue now.
    pub async fn flush_now(&self) -> Result<FlushOutcome, CommandError> {
        self.request(|respond_to| Command::FlushNow { respond_to })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CommandError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(build(respond_to))
            .await
            .map_err(|_closed| CommandError::Stopped)?;
        response.await.map_err(|_dropped| CommandError::Stopped)
    }
}

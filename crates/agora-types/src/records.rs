//! Queued records for write-behind persistence.
//!
//! Each record is an immutable fact captured the instant it happened. Records
//! carry their natural key so the persistence sink can replay a batch
//! without creating duplicates:
//!
//! | Record | Natural key | Write |
//! |--------|-------------|-------|
//! | [`ConversationInit`] | `conversation_id` | upsert |
//! | [`ConversationMessage`] | `(conversation_id, turn_index)` | upsert |
//! | [`AgentMemory`] | none | insert |
//! | [`EncounterStep`] | none | insert |
//! | [`PrivateMessage`] | `(session_id, client_message_id)` | upsert |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ChatSender, MemorySource, SenderType, StepType};
use crate::ids::{AgentId, CardId, ConversationId, MessageId, SessionId};

/// A conversation was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConversationInit {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Both participants, initiator first.
    pub participant_agent_ids: Vec<AgentId>,
    /// Encounter card the conversation belongs to.
    pub card_id: Option<CardId>,
    /// When the conversation started.
    pub created_at: DateTime<Utc>,
}

/// A line was added to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConversationMessage {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Position of the line in the conversation history.
    pub turn_index: u32,
    /// Speaking agent; absent for system notices.
    pub sender_agent_id: Option<AgentId>,
    /// Agent or system.
    pub sender_type: SenderType,
    /// Text of the line.
    pub content: String,
    /// When the line was produced.
    pub ts: DateTime<Utc>,
}

/// A memory was added to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentMemory {
    /// Agent that remembers.
    pub agent_id: AgentId,
    /// Conversation the memory summarizes, if any.
    pub conversation_id: Option<ConversationId>,
    /// Origin of the memory.
    pub source_type: MemorySource,
    /// Summary text.
    pub content: String,
    /// When the memory was formed.
    pub ts: DateTime<Utc>,
}

/// A lifecycle step of an encounter card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EncounterStep {
    /// Card the step belongs to.
    pub card_id: CardId,
    /// Kind of step.
    pub step_type: StepType,
    /// Agent the step is about, if any.
    pub agent_name: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// When the step happened.
    pub ts: DateTime<Utc>,
}

/// A line of a private chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PrivateMessage {
    /// Chat session.
    pub session_id: SessionId,
    /// Idempotency key within the session.
    pub client_message_id: MessageId,
    /// User or agent.
    pub sender_type: ChatSender,
    /// The agent, for agent messages.
    pub sender_agent_id: Option<AgentId>,
    /// Text.
    pub content: String,
    /// When it was written.
    pub ts: DateTime<Utc>,
}

/// One flush worth of queued records, submitted to persistence as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncBatch {
    /// Created conversations.
    pub conversation_inits: Vec<ConversationInit>,
    /// Conversation lines.
    pub conversation_messages: Vec<ConversationMessage>,
    /// New agent memories.
    pub agent_memories: Vec<AgentMemory>,
    /// Encounter card steps.
    pub encounter_steps: Vec<EncounterStep>,
    /// Private chat lines.
    pub private_messages: Vec<PrivateMessage>,
}

impl SyncBatch {
    /// Whether every buffer is empty.
    pub const fn is_empty(&self) -> bool {
        self.conversation_inits.is_empty()
            && self.conversation_messages.is_empty()
            && self.agent_memories.is_empty()
            && self.encounter_steps.is_empty()
            && self.private_messages.is_empty()
    }

    /// Total number of records across all buffers.
    pub const fn len(&self) -> usize {
        self.conversation_inits
            .len()
            .saturating_add(self.conversation_messages.len())
            .saturating_add(self.agent_memories.len())
            .saturating_add(self.encounter_steps.len())
            .saturating_add(self.private_messages.len())
    }
}

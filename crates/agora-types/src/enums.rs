//! Enumeration types for the Agora simulation.
//!
//! Every enum here has a stable lowercase wire form, which is also the
//! text stored in the database. `as_str` returns the same form for code
//! that binds values without going through serde.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Agent state
// ---------------------------------------------------------------------------

/// Behavioural state of an agent.
///
/// An agent in [`Thinking`](Self::Thinking) or [`Talking`](Self::Talking)
/// always carries a conversation id; an agent in the other two states never
/// does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Moving toward a random destination.
    Wandering,
    /// Waiting on its decision about a freshly detected encounter.
    Thinking,
    /// Taking part in a live conversation.
    Talking,
    /// Walking toward where another agent was last seen.
    Finding,
}

impl AgentState {
    /// Whether this state requires a conversation id.
    pub const fn is_engaged(self) -> bool {
        matches!(self, Self::Thinking | Self::Talking)
    }

    /// Whether an agent in this state moves and can be encountered.
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Wandering | Self::Finding)
    }

    /// Wire and storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wandering => "wandering",
            Self::Thinking => "thinking",
            Self::Talking => "talking",
            Self::Finding => "finding",
        }
    }
}

/// What an agent is currently trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MotivationAction {
    /// Roam without a destination in mind.
    Wander,
    /// Look for a specific agent.
    Find,
}

// ---------------------------------------------------------------------------
// Conversation records
// ---------------------------------------------------------------------------

/// Kind of a conversation history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A participant's utterance. Counts toward the turn limit.
    Turn,
    /// An informational line injected by the world. Does not count as a turn.
    Notice,
}

/// Who produced a persisted conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    /// One of the two participants.
    Agent,
    /// The simulation itself (world event notices).
    System,
}

impl SenderType {
    /// Wire and storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

/// Where an agent memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Summary of a finished conversation.
    Conversation,
    /// Recorded during an interview with the agent.
    Interview,
    /// Entered by an operator.
    Manual,
}

impl MemorySource {
    /// Wire and storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Interview => "interview",
            Self::Manual => "manual",
        }
    }
}

/// Lifecycle step recorded on an encounter card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Two agents came within range of each other.
    Encounter,
    /// One agent decided whether to talk.
    Decision,
    /// Both agents agreed and the conversation began.
    ConversationStart,
    /// One line of dialogue.
    Dialogue,
    /// The conversation ended.
    ConversationEnd,
}

impl StepType {
    /// Wire and storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encounter => "encounter",
            Self::Decision => "decision",
            Self::ConversationStart => "conversation_start",
            Self::Dialogue => "dialogue",
            Self::ConversationEnd => "conversation_end",
        }
    }
}

/// Author of a private chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ChatSender {
    /// The human on the other end of the chat.
    User,
    /// The agent being chatted with.
    Agent,
}

impl ChatSender {
    /// Wire and storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engaged_and_free_partition_states() {
        for state in [
            AgentState::Wandering,
            AgentState::Thinking,
            AgentState::Talking,
            AgentState::Finding,
        ] {
            assert_ne!(state.is_engaged(), state.is_free());
        }
    }

    #[test]
    fn wire_form_matches_as_str() {
        let json = serde_json::to_string(&StepType::ConversationStart).ok();
        assert_eq!(json.as_deref(), Some("\"conversation_start\""));
        let json = serde_json::to_string(&AgentState::Finding).ok();
        assert_eq!(json, Some(format!("\"{}\"", AgentState::Finding.as_str())));
    }
}

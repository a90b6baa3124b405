//! Core entity structs: agents, conversations, world events, and private
//! chat lines.
//!
//! State transitions on [`Agent`] go through methods that update the state
//! and the conversation id together, so the pairing between the two cannot
//! drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AgentState, ChatSender, EntryKind, MotivationAction};
use crate::ids::{AgentId, CardId, ConversationId, EventId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point in the 2D world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(self, other: Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// An agent's current intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Motivation {
    /// What the agent is doing.
    pub action: MotivationAction,
    /// Name of the agent being looked for, when finding.
    pub target_name: Option<String>,
}

impl Motivation {
    /// Roaming with no particular goal.
    pub const fn wander() -> Self {
        Self {
            action: MotivationAction::Wander,
            target_name: None,
        }
    }

    /// Looking for the named agent.
    pub const fn find(target_name: String) -> Self {
        Self {
            action: MotivationAction::Find,
            target_name: Some(target_name),
        }
    }
}

/// A simulated agent on the fixed roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Agent {
    /// Stable identifier.
    pub id: AgentId,
    /// Display name, also used to address the agent in prompts.
    pub name: String,
    /// Current location.
    pub position: Position,
    /// Where the agent is heading.
    pub target: Position,
    /// Behavioural state.
    pub state: AgentState,
    /// Current intent.
    pub motivation: Motivation,
    /// Text of the most recent speech bubble.
    pub last_message: Option<String>,
    /// Simulated time (ms) the bubble was shown.
    pub last_message_time: Option<u64>,
    /// Conversation summaries, oldest first. Append-only.
    pub memory: Vec<String>,
    /// Fixed persona text.
    pub background: String,
    /// Cosmetic avatar reference, opaque to the simulation.
    pub avatar: String,
    /// Present exactly when the agent is thinking or talking.
    pub conversation_id: Option<ConversationId>,
}

impl Agent {
    /// Create a wandering agent.
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        background: impl Into<String>,
        avatar: impl Into<String>,
        position: Position,
        target: Position,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            target,
            state: AgentState::Wandering,
            motivation: Motivation::wander(),
            last_message: None,
            last_message_time: None,
            memory: Vec::new(),
            background: background.into(),
            avatar: avatar.into(),
            conversation_id: None,
        }
    }

    /// Whether state and conversation id agree.
    pub const fn is_consistent(&self) -> bool {
        self.state.is_engaged() == self.conversation_id.is_some()
    }

    /// Enter the decision phase of an encounter.
    pub const fn begin_thinking(&mut self, pending: ConversationId) {
        self.state = AgentState::Thinking;
        self.conversation_id = Some(pending);
    }

    /// Join a conversation. The movement target is frozen in place.
    pub const fn begin_talking(&mut self, conversation: ConversationId) {
        self.state = AgentState::Talking;
        self.conversation_id = Some(conversation);
        self.target = self.position;
    }

    /// Return to wandering toward `target`.
    pub fn wander(&mut self, target: Position) {
        self.state = AgentState::Wandering;
        self.conversation_id = None;
        self.motivation = Motivation::wander();
        self.target = target;
    }

    /// Start looking for `target_name`, heading to where they are now.
    pub fn find(&mut self, target_name: String, target: Position) {
        self.state = AgentState::Finding;
        self.conversation_id = None;
        self.motivation = Motivation::find(target_name);
        self.target = target;
    }

    /// Show a transient speech bubble.
    pub fn say(&mut self, text: impl Into<String>, now_ms: u64) {
        self.last_message = Some(text.into());
        self.last_message_time = Some(now_ms);
    }

    /// The most recent `window` memories, oldest first.
    pub fn recent_memory(&self, window: usize) -> &[String] {
        let start = self.memory.len().saturating_sub(window);
        self.memory.get(start..).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One entry in a conversation's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistoryEntry {
    /// Display name of the speaker (`World` for notices).
    pub speaker_name: String,
    /// What was said.
    pub utterance: String,
    /// Turn or notice.
    pub kind: EntryKind,
}

/// A live conversation between two agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Conversation {
    /// Identifier.
    pub id: ConversationId,
    /// Initiator first, responder second.
    pub participants: [AgentId; 2],
    /// Participant whose turn it is.
    pub turn: AgentId,
    /// Number of turns taken so far.
    pub turn_count: u32,
    /// Entries in the order they happened.
    pub history: Vec<HistoryEntry>,
    /// Encounter card this conversation belongs to.
    pub card_id: Option<CardId>,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation in which `initiator` speaks first.
    pub const fn new(
        id: ConversationId,
        initiator: AgentId,
        responder: AgentId,
        card_id: Option<CardId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            participants: [initiator, responder],
            turn: initiator,
            turn_count: 0,
            history: Vec::new(),
            card_id,
            created_at,
        }
    }

    /// Whether `agent` takes part in this conversation.
    pub fn has_participant(&self, agent: AgentId) -> bool {
        self.participants.contains(&agent)
    }

    /// The participant that is not `agent`.
    pub fn other(&self, agent: AgentId) -> Option<AgentId> {
        let [first, second] = self.participants;
        if agent == first {
            Some(second)
        } else if agent == second {
            Some(first)
        } else {
            None
        }
    }

    /// Hand the turn to the other participant.
    pub fn flip_turn(&mut self) {
        if let Some(next) = self.other(self.turn) {
            self.turn = next;
        }
    }

    /// Append a participant utterance and count the turn.
    ///
    /// Returns the history index of the new entry.
    pub fn record_turn(&mut self, speaker_name: String, utterance: String) -> u32 {
        self.turn_count = self.turn_count.saturating_add(1);
        self.push(speaker_name, utterance, EntryKind::Turn)
    }

    /// Append an informational line that does not count as a turn.
    ///
    /// Returns the history index of the new entry.
    pub fn record_notice(&mut self, speaker_name: String, utterance: String) -> u32 {
        self.push(speaker_name, utterance, EntryKind::Notice)
    }

    fn push(&mut self, speaker_name: String, utterance: String, kind: EntryKind) -> u32 {
        let index = u32::try_from(self.history.len()).unwrap_or(u32::MAX);
        self.history.push(HistoryEntry {
            speaker_name,
            utterance,
            kind,
        });
        index
    }
}

// ---------------------------------------------------------------------------
// World event and private chat
// ---------------------------------------------------------------------------

/// The single global event injected into every reasoning prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldEvent {
    /// Identifier.
    pub id: EventId,
    /// What is happening.
    pub description: String,
    /// Wall-clock time the event was set.
    pub created_at: DateTime<Utc>,
}

/// One line of a private chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChatLine {
    /// Who wrote it.
    pub sender: ChatSender,
    /// Text.
    pub message: String,
    /// Wall-clock time it was written.
    pub timestamp: DateTime<Utc>,
}

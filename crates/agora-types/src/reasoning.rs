//! Reasoner prompt contexts and validated reasoner outputs.
//!
//! The contexts are what the scheduler knows at call time; they serialize
//! straight into prompt templates. The reasoner answers in loosely-typed
//! JSON, and the output types here are the shapes the simulation acts on
//! once an answer has been validated. Anything that does not validate is
//! replaced by a safe default before it reaches the scheduler.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::structs::{ChatLine, HistoryEntry, Motivation};

// ---------------------------------------------------------------------------
// Prompt contexts
// ---------------------------------------------------------------------------

/// Everything an agent considers when deciding whether to talk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContext {
    /// The deciding agent.
    pub agent_name: String,
    /// Their persona.
    pub background: String,
    /// Their most recent memories, oldest first.
    pub memories: Vec<String>,
    /// What they are currently doing.
    pub motivation: Motivation,
    /// Current world event, if any.
    pub world_event: Option<String>,
    /// The agent they just ran into.
    pub other_name: String,
}

/// Everything a speaker considers when producing a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnContext {
    /// The speaking agent.
    pub speaker_name: String,
    /// Their persona.
    pub background: String,
    /// Their most recent memories, oldest first.
    pub memories: Vec<String>,
    /// Who they are talking to.
    pub other_name: String,
    /// Current world event, if any.
    pub world_event: Option<String>,
    /// Full conversation so far, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Turns already taken.
    pub turn_count: u32,
    /// Turn limit after which the conversation is cut off.
    pub max_turns: u32,
    /// Names the speaker may choose to go and find.
    pub known_agents: Vec<String>,
}

/// A request to summarize a conversation from one participant's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryContext {
    /// Whose memory the summary becomes.
    pub agent_name: String,
    /// The other participant.
    pub other_name: String,
    /// The finished conversation, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Length budget for the summary, in characters.
    pub max_chars: usize,
}

/// A private chat message addressed to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContext {
    /// The agent being chatted with.
    pub agent_name: String,
    /// Their persona.
    pub background: String,
    /// Their most recent memories, oldest first.
    pub memories: Vec<String>,
    /// Current world event, if any.
    pub world_event: Option<String>,
    /// The tail of the session before `message`, oldest first.
    pub recent: Vec<ChatLine>,
    /// What the user just said.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Validated outputs
// ---------------------------------------------------------------------------

/// An agent's answer to "do you want to talk to them?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TalkDecision {
    /// Whether the agent wants to start a conversation.
    pub should_initiate: bool,
    /// Free-text explanation.
    pub reason: String,
}

impl TalkDecision {
    /// A refusal carrying `reason`. Used when reasoning fails.
    pub fn decline(reason: impl Into<String>) -> Self {
        Self {
            should_initiate: false,
            reason: reason.into(),
        }
    }
}

/// What the speaker wants to do after their line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SpeakerAction {
    /// Keep the conversation going.
    ContinueTalking,
    /// End the conversation and roam.
    LeaveAndWander,
    /// End the conversation and go look for someone.
    LeaveAndFind {
        /// Name of the agent to look for.
        target_name: String,
    },
}

impl SpeakerAction {
    /// Whether this action ends the conversation.
    pub const fn ends_conversation(&self) -> bool {
        !matches!(self, Self::ContinueTalking)
    }
}

/// One conversation turn produced by the reasoner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TurnReply {
    /// The spoken line.
    pub dialogue: String,
    /// What the speaker does next.
    pub action: SpeakerAction,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn speaker_action_uses_tagged_wire_form() {
        let action: SpeakerAction =
            serde_json::from_str(r#"{"action":"leave_and_find","target_name":"Bo"}"#).unwrap();
        assert_eq!(
            action,
            SpeakerAction::LeaveAndFind {
                target_name: String::from("Bo")
            }
        );
        assert!(action.ends_conversation());

        let action: SpeakerAction = serde_json::from_str(r#"{"action":"continue_talking"}"#).unwrap();
        assert!(!action.ends_conversation());
    }

    #[test]
    fn decline_never_initiates() {
        let decision = TalkDecision::decline("timeout");
        assert!(!decision.should_initiate);
        assert_eq!(decision.reason, "timeout");
    }
}

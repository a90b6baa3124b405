//! Shared type definitions for the Agora simulation.
//!
//! This crate is the single source of truth for the data model shared by
//! the scheduler, the reasoner, the persistence layer, and the operator API.
//! Types defined here flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Agent states and record classifiers
//! - [`structs`] -- Agents, conversations, world events, chat lines
//! - [`reasoning`] -- Reasoner prompt contexts and validated outputs
//! - [`records`] -- Queued records and the batch submitted to persistence

pub mod enums;
pub mod ids;
pub mod reasoning;
pub mod records;
pub mod structs;

pub use enums::{
    AgentState, ChatSender, EntryKind, MemorySource, MotivationAction, SenderType, StepType,
};
pub use ids::{AgentId, CardId, ConversationId, EventId, MessageId, SessionId};
pub use reasoning::{
    ChatContext, DecisionContext, SpeakerAction, SummaryContext, TalkDecision, TurnContext,
    TurnReply,
};
pub use records::{
    AgentMemory, ConversationInit, ConversationMessage, EncounterStep, PrivateMessage, SyncBatch,
};
pub use structs::{Agent, ChatLine, Conversation, HistoryEntry, Motivation, Position, WorldEvent};

//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity the simulation persists has a strongly-typed ID so that a
//! conversation id can never be passed where a chat session id is expected.
//! Entity IDs use UUID v7 (time-ordered) so that natural keys sort by
//! creation time in the database.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent on the roster.
    AgentId
}

define_id! {
    /// Unique identifier for a conversation between two agents.
    ///
    /// Allocated when an encounter fires, carried by both agents while they
    /// decide, and kept as the conversation id if both consent.
    ConversationId
}

define_id! {
    /// Correlation id grouping every lifecycle step of one encounter.
    CardId
}

define_id! {
    /// Unique identifier for a world event.
    EventId
}

define_id! {
    /// Unique identifier for a private chat session with one agent.
    SessionId
}

define_id! {
    /// Client-side identifier of a private chat message, used as the
    /// idempotency key on replay.
    MessageId
}

/// Namespace for roster-derived agent ids.
const AGENT_NAMESPACE: Uuid = Uuid::from_u128(0x6a1e_4c0b_9f3d_5e27_b8a4_31c6_d07f_e912);

impl AgentId {
    /// The id of the roster agent called `name` (UUID v5).
    ///
    /// Roster names are unique, so the same roster always yields the same
    /// ids and persisted rows stay attributable across restarts.
    pub fn for_roster_name(name: &str) -> Self {
        Self(Uuid::new_v5(&AGENT_NAMESPACE, name.as_bytes()))
    }
}

impl MessageId {
    /// Create a random (UUID v4) message id.
    ///
    /// Message ids only need to be unique within their session, so they do
    /// not carry an ordering.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_time_ordered() {
        let first = ConversationId::new();
        let second = ConversationId::new();
        assert!(first <= second);
        assert_ne!(first.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_serializes_as_bare_uuid() {
        let id = AgentId::new();
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json, Some(format!("\"{}\"", id.into_inner())));
    }

    #[test]
    fn roster_ids_depend_only_on_name() {
        assert_eq!(AgentId::for_roster_name("Mira"), AgentId::for_roster_name("Mira"));
        assert_ne!(AgentId::for_roster_name("Mira"), AgentId::for_roster_name("Tomas"));
        assert_eq!(AgentId::for_roster_name("Mira").into_inner().get_version_num(), 5);
    }

    #[test]
    fn random_message_ids_differ() {
        assert_ne!(MessageId::random(), MessageId::random());
    }
}

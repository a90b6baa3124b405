//! Post-conversation memory synthesis.
//!
//! Each participant gets an independent summary written from their own
//! point of view. The two calls share no state; a failure on one side is
//! logged and skipped without touching the other.

use agora_types::{AgentId, AgentMemory, ConversationId, MemorySource, SummaryContext};
use tracing::{info, warn};

use crate::context::SimulationContext;
use crate::reasoner::ReasonError;
use crate::session::Termination;

/// One participant's pending summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRequest {
    /// Whose memory this becomes.
    pub agent_id: AgentId,
    /// The conversation being summarized.
    pub conversation_id: ConversationId,
    /// Prompt context for the reasoner.
    pub context: SummaryContext,
}

/// Build both participants' summary requests.
///
/// Empty when the conversation ended before anyone spoke.
pub fn requests(ctx: &SimulationContext, termination: &Termination) -> Vec<MemoryRequest> {
    if termination.history.is_empty() {
        return Vec::new();
    }
    let [first, second] = termination.participants;
    [(first, second), (second, first)]
        .into_iter()
        .map(|(agent_id, other_id)| MemoryRequest {
            agent_id,
            conversation_id: termination.conversation_id,
            context: SummaryContext {
                agent_name: ctx.agent_name(agent_id),
                other_name: ctx.agent_name(other_id),
                history: termination.history.clone(),
                max_chars: ctx.config.conversation.memory_summary_chars,
            },
        })
        .collect()
}

/// Store a summary result. Returns whether a memory was written.
pub fn apply(
    ctx: &mut SimulationContext,
    request: &MemoryRequest,
    result: Result<String, ReasonError>,
) -> bool {
    let summary = match result {
        Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
        Ok(_) => {
            warn!(agent = %request.context.agent_name, "empty summary, no memory written");
            return false;
        }
        Err(err) => {
            warn!(
                agent = %request.context.agent_name,
                error = %err,
                "summary failed, no memory written"
            );
            return false;
        }
    };

    let Some(agent) = ctx.agent_mut(request.agent_id) else {
        return false;
    };
    agent.memory.push(summary.clone());
    info!(agent = %agent.name, memories = agent.memory.len(), "memory formed");

    let ts = ctx.wall_now();
    ctx.sync.push_agent_memory(AgentMemory {
        agent_id: request.agent_id,
        conversation_id: Some(request.conversation_id),
        source_type: MemorySource::Conversation,
        content: summary,
        ts,
    });
    true
}

//! [`Reasoner`] backed by the LLM gateway.
//!
//! Every gateway failure is collapsed into a [`ReasonError`]; the scheduler
//! then substitutes its in-world default. Timeouts keep their deadline so
//! they can be told apart in the logs.

use agora_core::{ReasonError, Reasoner};
use agora_reasoner::{ReasonerError, ReasonerGateway};
use agora_types::{
    ChatContext, DecisionContext, SummaryContext, TalkDecision, TurnContext, TurnReply,
};

/// A reasoner that asks an LLM through [`ReasonerGateway`].
pub struct LlmReasoner {
    gateway: ReasonerGateway,
}

impl LlmReasoner {
    /// Wrap a configured gateway.
    pub const fn new(gateway: ReasonerGateway) -> Self {
        Self { gateway }
    }
}

impl Reasoner for LlmReasoner {
    async fn decide(&self, ctx: DecisionContext) -> Result<TalkDecision, ReasonError> {
        self.gateway.decide(&ctx).await.map_err(to_reason_error)
    }

    async fn speak(&self, ctx: TurnContext) -> Result<TurnReply, ReasonError> {
        self.gateway.speak(&ctx).await.map_err(to_reason_error)
    }

    async fn summarize(&self, ctx: SummaryContext) -> Result<String, ReasonError> {
        self.gateway.summarize(&ctx).await.map_err(to_reason_error)
    }

    async fn chat(&self, ctx: ChatContext) -> Result<String, ReasonError> {
        self.gateway.chat(&ctx).await.map_err(to_reason_error)
    }
}

fn to_reason_error(err: ReasonerError) -> ReasonError {
    match err {
        ReasonerError::Timeout { deadline_ms } => ReasonError::Timeout { deadline_ms },
        other => ReasonError::internal(other.to_string()),
    }
}

//! The reasoner gateway: render, call, parse.
//!
//! One method per question the simulation asks. Each call renders the
//! matching template, sends it to the primary backend (falling back to the
//! secondary backend on failure), and validates the answer, all under a
//! single deadline. Failures come back as [`ReasonerError`]; choosing a safe
//! in-world default is the caller's job.

use std::time::Duration;

use agora_types::{ChatContext, DecisionContext, SummaryContext, TalkDecision, TurnContext, TurnReply};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ReasonerConfig;
use crate::error::ReasonerError;
use crate::llm::{LlmBackend, create_backend};
use crate::parse;
use crate::prompt::{PromptEngine, PromptKind, RenderedPrompt};

/// Prompt-in, validated-answer-out access to the LLM backends.
pub struct ReasonerGateway {
    primary: LlmBackend,
    fallback: Option<LlmBackend>,
    prompts: PromptEngine,
    call_timeout: Duration,
}

impl ReasonerGateway {
    /// Assemble a gateway from already-built parts.
    pub const fn new(
        primary: LlmBackend,
        fallback: Option<LlmBackend>,
        prompts: PromptEngine,
        call_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            prompts,
            call_timeout,
        }
    }

    /// Build a gateway from configuration.
    pub fn from_config(config: &ReasonerConfig) -> Result<Self, ReasonerError> {
        let prompts = match config.templates_dir.as_deref() {
            Some(dir) => PromptEngine::from_dir(dir)?,
            None => PromptEngine::builtin()?,
        };
        Ok(Self::new(
            create_backend(&config.primary_backend),
            config.fallback_backend.as_ref().map(create_backend),
            prompts,
            config.call_timeout,
        ))
    }

    /// Ask whether an agent wants to start a conversation.
    pub async fn decide(&self, ctx: &DecisionContext) -> Result<TalkDecision, ReasonerError> {
        self.ask(PromptKind::Decide, ctx, parse::parse_decision).await
    }

    /// Ask the speaker for their next line and action.
    pub async fn speak(&self, ctx: &TurnContext) -> Result<TurnReply, ReasonerError> {
        self.ask(PromptKind::Turn, ctx, parse::parse_turn).await
    }

    /// Ask for one participant's summary of a finished conversation.
    pub async fn summarize(&self, ctx: &SummaryContext) -> Result<String, ReasonerError> {
        let mut summary = self.ask(PromptKind::Summary, ctx, parse::parse_summary).await?;
        truncate_chars(&mut summary, ctx.max_chars);
        Ok(summary)
    }

    /// Ask for an agent's reply to a private message.
    pub async fn chat(&self, ctx: &ChatContext) -> Result<String, ReasonerError> {
        self.ask(PromptKind::Chat, ctx, parse::parse_chat_reply).await
    }

    /// Render, call under the deadline, and validate.
    async fn ask<S, T, P>(&self, kind: PromptKind, ctx: &S, parse: P) -> Result<T, ReasonerError>
    where
        S: Serialize + Sync,
        P: FnOnce(&str) -> Result<T, ReasonerError>,
    {
        let prompt = self.prompts.render(kind, ctx)?;
        let deadline_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX);
        let raw = timeout(self.call_timeout, self.call_with_fallback(&prompt))
            .await
            .map_err(|_elapsed| ReasonerError::Timeout { deadline_ms })??;
        debug!(
            prompt = kind.template_name(),
            response_len = raw.len(),
            "reasoner responded"
        );
        parse(&raw)
    }

    /// Try the primary backend, then the fallback backend if configured.
    async fn call_with_fallback(&self, prompt: &RenderedPrompt) -> Result<String, ReasonerError> {
        match self.primary.complete(prompt).await {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                let Some(fallback) = self.fallback.as_ref() else {
                    return Err(primary_err);
                };
                warn!(
                    backend = self.primary.name(),
                    error = %primary_err,
                    "primary backend failed, trying fallback"
                );
                fallback.complete(prompt).await
            }
        }
    }
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((byte_index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_index);
    }
}

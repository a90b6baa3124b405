//! The reasoning seam between the scheduler and whatever answers its
//! questions.
//!
//! The scheduler asks four kinds of question: should an agent talk, what
//! does a speaker say, what does an agent remember, and how does an agent
//! answer a private message. The [`Reasoner`] trait abstracts how those
//! answers are obtained; it could be an LLM gateway, a scripted bot, or a
//! test double.
//!
//! [`ScriptedReasoner`] answers from a script and records what it was asked,
//! which lets the scheduler be exercised end-to-end without a network.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use agora_types::{
    ChatContext, DecisionContext, SpeakerAction, SummaryContext, TalkDecision, TurnContext,
    TurnReply,
};

/// Errors a reasoner may report.
///
/// The scheduler never propagates these; every failure is replaced by a
/// safe in-world default at the call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasonError {
    /// The call did not complete within its deadline.
    #[error("reasoner timed out (deadline: {deadline_ms}ms)")]
    Timeout {
        /// The deadline in milliseconds.
        deadline_ms: u64,
    },

    /// Transport, parse, or schema failure inside the reasoner.
    #[error("reasoner error: {message}")]
    Internal {
        /// Description of the error.
        message: String,
    },
}

impl ReasonError {
    /// Shorthand for an [`Internal`](Self::Internal) error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// A source of agent reasoning.
///
/// Implementations must be cheap to share: the scheduler holds one behind an
/// `Arc` and issues calls from many in-flight futures at once.
pub trait Reasoner: Send + Sync + 'static {
    /// Decide whether the agent wants to start a conversation.
    fn decide(
        &self,
        ctx: DecisionContext,
    ) -> impl Future<Output = Result<TalkDecision, ReasonError>> + Send;

    /// Produce the speaker's next line and follow-up action.
    fn speak(&self, ctx: TurnContext)
    -> impl Future<Output = Result<TurnReply, ReasonError>> + Send;

    /// Summarize a finished conversation from one participant's side.
    fn summarize(
        &self,
        ctx: SummaryContext,
    ) -> impl Future<Output = Result<String, ReasonError>> + Send;

    /// Answer a private chat message.
    fn chat(&self, ctx: ChatContext) -> impl Future<Output = Result<String, ReasonError>> + Send;
}

// ---------------------------------------------------------------------------
// Scripted reasoner
// ---------------------------------------------------------------------------

/// A reasoner that answers from a script.
///
/// - Decisions come from a per-agent table, falling back to a default.
/// - Turn replies are popped from a queue, falling back to a default turn.
/// - Summaries are `"<agent> talked with <other>"` unless the agent is listed
///   as failing.
/// - Chat replies come from a single configured result.
#[derive(Debug)]
pub struct ScriptedReasoner {
    decisions: BTreeMap<String, Result<TalkDecision, ReasonError>>,
    default_decision: TalkDecision,
    turns: Mutex<VecDeque<Result<TurnReply, ReasonError>>>,
    default_turn: TurnReply,
    failing_summaries: BTreeSet<String>,
    chat_reply: Result<String, ReasonError>,
    speakers: Mutex<Vec<String>>,
    decide_calls: AtomicUsize,
    speak_calls: AtomicUsize,
    summarize_calls: AtomicUsize,
    chat_calls: AtomicUsize,
}

impl Default for ScriptedReasoner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedReasoner {
    /// A reasoner under which every agent agrees to talk and every speaker
    /// keeps talking.
    pub fn new() -> Self {
        Self {
            decisions: BTreeMap::new(),
            default_decision: TalkDecision {
                should_initiate: true,
                reason: String::from("scripted"),
            },
            turns: Mutex::new(VecDeque::new()),
            default_turn: TurnReply {
                dialogue: String::from("Tell me more."),
                action: SpeakerAction::ContinueTalking,
            },
            failing_summaries: BTreeSet::new(),
            chat_reply: Ok(String::from("Nice to hear from you.")),
            speakers: Mutex::new(Vec::new()),
            decide_calls: AtomicUsize::new(0),
            speak_calls: AtomicUsize::new(0),
            summarize_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
        }
    }

    /// Answer every decision without a per-agent entry with `should_initiate`.
    #[must_use]
    pub fn with_default_decision(mut self, should_initiate: bool) -> Self {
        self.default_decision.should_initiate = should_initiate;
        self
    }

    /// Script the decision of the named agent.
    #[must_use]
    pub fn with_decision(mut self, agent_name: &str, should_initiate: bool) -> Self {
        self.decisions.insert(
            agent_name.to_owned(),
            Ok(TalkDecision {
                should_initiate,
                reason: String::from("scripted"),
            }),
        );
        self
    }

    /// Make the named agent's decision call fail.
    #[must_use]
    pub fn with_failing_decision(mut self, agent_name: &str) -> Self {
        self.decisions
            .insert(agent_name.to_owned(), Err(ReasonError::internal("scripted failure")));
        self
    }

    /// Queue turn replies, consumed in order across all conversations.
    #[must_use]
    pub fn with_turns(self, turns: impl IntoIterator<Item = Result<TurnReply, ReasonError>>) -> Self {
        if let Ok(mut queue) = self.turns.lock() {
            queue.extend(turns);
        }
        self
    }

    /// Reply used once the queued turns run out.
    #[must_use]
    pub fn with_default_turn(mut self, turn: TurnReply) -> Self {
        self.default_turn = turn;
        self
    }

    /// Make the named agent's summary call fail.
    #[must_use]
    pub fn with_failing_summary(mut self, agent_name: &str) -> Self {
        self.failing_summaries.insert(agent_name.to_owned());
        self
    }

    /// Result returned by every chat call.
    #[must_use]
    pub fn with_chat_reply(mut self, reply: Result<String, ReasonError>) -> Self {
        self.chat_reply = reply;
        self
    }

    /// Number of decision calls received.
    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::Acquire)
    }

    /// Number of turn calls received.
    pub fn speak_calls(&self) -> usize {
        self.speak_calls.load(Ordering::Acquire)
    }

    /// Number of summary calls received.
    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::Acquire)
    }

    /// Number of chat calls received.
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::Acquire)
    }

    /// Speaker names of every turn call, in call order.
    pub fn speakers(&self) -> Vec<String> {
        self.speakers
            .lock()
            .map(|speakers| speakers.clone())
            .unwrap_or_default()
    }

    fn next_turn(&self) -> Result<TurnReply, ReasonError> {
        self.turns
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Ok(self.default_turn.clone()))
    }
}

impl Reasoner for ScriptedReasoner {
    async fn decide(&self, ctx: DecisionContext) -> Result<TalkDecision, ReasonError> {
        self.decide_calls.fetch_add(1, Ordering::AcqRel);
        self.decisions
            .get(&ctx.agent_name)
            .cloned()
            .unwrap_or_else(|| Ok(self.default_decision.clone()))
    }

    async fn speak(&self, ctx: TurnContext) -> Result<TurnReply, ReasonError> {
        self.speak_calls.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut speakers) = self.speakers.lock() {
            speakers.push(ctx.speaker_name);
        }
        self.next_turn()
    }

    async fn summarize(&self, ctx: SummaryContext) -> Result<String, ReasonError> {
        self.summarize_calls.fetch_add(1, Ordering::AcqRel);
        if self.failing_summaries.contains(&ctx.agent_name) {
            return Err(ReasonError::internal("scripted summary failure"));
        }
        Ok(format!("{} talked with {}", ctx.agent_name, ctx.other_name))
    }

    async fn chat(&self, _ctx: ChatContext) -> Result<String, ReasonError> {
        self.chat_calls.fetch_add(1, Ordering::AcqRel);
        self.chat_reply.clone()
    }
}

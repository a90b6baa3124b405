//! The scheduler: one tick at a time, one writer for all state.
//!
//! A tick advances the clock, moves free agents, detects encounters and
//! issues their decision calls, then dispatches every conversation turn
//! whose ready-at time has come. Reasoner and persistence calls never block
//! the tick: each is pushed into an in-flight set as a future that owns its
//! inputs, and its result comes back as a [`Completion`] that the scheduler
//! applies. Only [`Simulation::apply`] and [`Simulation::handle`] mutate
//! state between ticks.
//!
//! Turn pacing is a ready-at timestamp in simulated time, not a sleep, so a
//! test can drive whole conversations by calling [`Simulation::tick`] and
//! [`Simulation::run_until_idle`] without waiting on a real clock.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agora_types::{ConversationId, SummaryContext, TalkDecision, TurnReply};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::oneshot;
use tracing::debug;

use crate::chat::{self, PendingChat};
use crate::clock::ClockError;
use crate::command::{ChatReply, Command, CommandError};
use crate::context::SimulationContext;
use crate::decision::{self, DecisionOutcome, PendingDecision};
use crate::encounter::{self, Encounter};
use crate::memory::{self, MemoryRequest};
use crate::movement;
use crate::reasoner::{ReasonError, Reasoner};
use crate::session::{self, Termination, TurnOutcome, TurnPlan, TurnTicket};
use crate::snapshot::SimulationSnapshot;
use crate::sync::{FlushMarks, FlushOutcome, PersistError, PersistenceSink};
use crate::world_event;

/// The result of a piece of in-flight work, waiting to be applied.
#[derive(Debug)]
pub enum Completion {
    /// Both decisions of an encounter.
    Decision {
        /// The encounter being decided.
        pending: PendingDecision,
        /// The first agent's answer.
        first: Result<TalkDecision, ReasonError>,
        /// The second agent's answer.
        second: Result<TalkDecision, ReasonError>,
    },
    /// One conversation turn.
    Turn {
        /// The turn the call was issued for.
        ticket: TurnTicket,
        /// The speaker's answer.
        reply: Result<TurnReply, ReasonError>,
    },
    /// Both participants' summaries of a finished conversation.
    Memory {
        /// Each request with its result.
        results: Vec<(MemoryRequest, Result<String, ReasonError>)>,
    },
    /// An agent's reply to a private message.
    Chat {
        /// The exchange being answered.
        pending: PendingChat,
        /// The agent's answer.
        reply: Result<String, ReasonError>,
        /// Where the caller waits for the reply.
        respond_to: oneshot::Sender<Result<ChatReply, CommandError>>,
    },
    /// A sync flush.
    Flush {
        /// What the flush covered.
        marks: FlushMarks,
        /// The sink's answer.
        result: Result<(), PersistError>,
    },
}

/// The simulation scheduler.
pub struct Simulation<R, S> {
    ctx: SimulationContext,
    reasoner: Arc<R>,
    sink: Arc<S>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    due_turns: BTreeSet<(u64, ConversationId)>,
    flush_waiters: Vec<oneshot::Sender<FlushOutcome>>,
    stopping: bool,
}

impl<R: Reasoner, S: PersistenceSink> Simulation<R, S> {
    /// Wrap a context with its reasoner and persistence sink.
    pub fn new(ctx: SimulationContext, reasoner: Arc<R>, sink: Arc<S>) -> Self {
        Self {
            ctx,
            reasoner,
            sink,
            in_flight: FuturesUnordered::new(),
            due_turns: BTreeSet::new(),
            flush_waiters: Vec::new(),
            stopping: false,
        }
    }

    /// The simulation state.
    pub const fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    /// The simulation state, mutably.
    pub const fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.ctx
    }

    /// The reasoner shared by all in-flight calls.
    pub const fn reasoner(&self) -> &Arc<R> {
        &self.reasoner
    }

    /// Whether any reasoner or persistence call is outstanding.
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Run one tick. Returns the new tick number.
    ///
    /// After [`shutdown`](Self::shutdown) this is a no-op that returns the
    /// current tick, so no agent is moved into a decision that would never
    /// be issued.
    pub fn tick(&mut self) -> Result<u64, ClockError> {
        if self.stopping {
            return Ok(self.ctx.clock.tick());
        }
        let tick = self.ctx.clock.advance()?;
        movement::step_agents(&mut self.ctx);
        for encounter in encounter::detect_encounters(&mut self.ctx) {
            self.begin_decision(encounter);
        }
        self.dispatch_due_turns();
        Ok(tick)
    }

    /// Wait for the next piece of in-flight work to finish.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.in_flight.next().await
    }

    /// Apply completions until nothing is in flight.
    ///
    /// Turns scheduled for a later tick stay scheduled.
    pub async fn run_until_idle(&mut self) {
        while let Some(completion) = self.in_flight.next().await {
            self.apply(completion);
        }
    }

    /// Apply the result of finished work.
    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Decision {
                pending,
                first,
                second,
            } => {
                let outcome = decision::resolve(&mut self.ctx, pending, first, second);
                if let DecisionOutcome::Started(id) = outcome {
                    self.dispatch_turn(id);
                }
            }
            Completion::Turn { ticket, reply } => {
                match session::apply_turn(&mut self.ctx, ticket, reply) {
                    TurnOutcome::Continue { due_ms } => {
                        self.schedule_turn(ticket.conversation_id, due_ms);
                    }
                    TurnOutcome::Ended(termination) => self.synthesize_memories(&termination),
                    TurnOutcome::Dropped => {}
                }
            }
            Completion::Memory { results } => {
                for (request, result) in results {
                    memory::apply(&mut self.ctx, &request, result);
                }
            }
            Completion::Chat {
                pending,
                reply,
                respond_to,
            } => {
                let reply = chat::finish(&mut self.ctx, pending, reply);
                let _ = respond_to.send(Ok(reply));
            }
            Completion::Flush { marks, result } => {
                self.settle_flush(marks, result);
            }
        }
    }

    /// Apply an operator command.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::SetWorldEvent {
                description,
                respond_to,
            } => {
                let _ = respond_to.send(world_event::set(&mut self.ctx, &description));
            }
            Command::ClearWorldEvent { respond_to } => {
                let _ = respond_to.send(world_event::clear(&mut self.ctx));
            }
            Command::PrivateChat {
                agent_id,
                session_id,
                message,
                respond_to,
            } => match chat::begin(&mut self.ctx, agent_id, session_id, &message) {
                Ok((pending, chat_ctx)) => {
                    let reasoner = Arc::clone(&self.reasoner);
                    self.spawn(async move {
                        let reply = reasoner.chat(chat_ctx).await;
                        Completion::Chat {
                            pending,
                            reply,
                            respond_to,
                        }
                    });
                }
                Err(err) => {
                    let _ = respond_to.send(Err(err));
                }
            },
            Command::ResetConversation {
                conversation_id,
                respond_to,
            } => {
                let result = match session::reset_conversation(&mut self.ctx, conversation_id) {
                    Some(termination) => {
                        self.synthesize_memories(&termination);
                        Ok(())
                    }
                    None => Err(CommandError::UnknownConversation(conversation_id)),
                };
                let _ = respond_to.send(result);
            }
            Command::FlushNow { respond_to } => {
                if self.ctx.sync.is_in_flight() {
                    let _ = respond_to.send(FlushOutcome::InFlight);
                } else if self.start_flush() {
                    self.flush_waiters.push(respond_to);
                } else {
                    let _ = respond_to.send(FlushOutcome::Empty);
                }
            }
        }
    }

    /// Submit every queued record to the sink in the background.
    ///
    /// Returns `false` if there was nothing to flush or a flush is already
    /// in flight.
    pub fn start_flush(&mut self) -> bool {
        let Some((batch, marks)) = self.ctx.sync.begin_flush() else {
            return false;
        };
        let sink = Arc::clone(&self.sink);
        let deadline_ms = self.ctx.config.sync.flush_timeout_ms;
        debug!(records = marks.records(), "sync flush started");
        self.in_flight.push(
            async move {
                let deadline = Duration::from_millis(deadline_ms);
                let result = tokio::time::timeout(deadline, sink.persist(&batch))
                    .await
                    .unwrap_or(Err(PersistError::Timeout { deadline_ms }));
                Completion::Flush { marks, result }
            }
            .boxed(),
        );
        true
    }

    /// Stop issuing new work and run a final flush.
    ///
    /// A flush already in flight is settled first so its records are not
    /// submitted twice. Work still outstanding once the final flush settles
    /// is dropped.
    pub async fn shutdown(&mut self) -> FlushOutcome {
        let outcome = self.final_flush().await;
        self.in_flight = FuturesUnordered::new();
        outcome
    }

    async fn final_flush(&mut self) -> FlushOutcome {
        self.stopping = true;
        while self.ctx.sync.is_in_flight() {
            match self.in_flight.next().await {
                Some(completion) => self.apply(completion),
                None => break,
            }
        }
        if !self.start_flush() {
            return FlushOutcome::Empty;
        }
        while let Some(completion) = self.in_flight.next().await {
            match completion {
                Completion::Flush { marks, result } => return self.settle_flush(marks, result),
                other => self.apply(other),
            }
        }
        FlushOutcome::Empty
    }

    /// A copy of the observable state.
    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            tick: self.ctx.clock.tick(),
            sim_time_ms: self.ctx.now_ms(),
            agents: self.ctx.agents.clone(),
            conversations: self.ctx.conversations.values().cloned().collect(),
            world_event: self.ctx.world_event.clone(),
            queue: self.ctx.sync.depths(),
            flush_in_flight: self.ctx.sync.is_in_flight(),
        }
    }

    fn spawn(&mut self, work: impl Future<Output = Completion> + Send + 'static) {
        if self.stopping {
            return;
        }
        self.in_flight.push(work.boxed());
    }

    fn begin_decision(&mut self, encounter: Encounter) {
        let Some((pending, first_ctx, second_ctx)) = decision::begin(&mut self.ctx, encounter)
        else {
            return;
        };
        let reasoner = Arc::clone(&self.reasoner);
        self.spawn(async move {
            let (first, second) =
                futures::join!(reasoner.decide(first_ctx), reasoner.decide(second_ctx));
            Completion::Decision {
                pending,
                first,
                second,
            }
        });
    }

    fn schedule_turn(&mut self, id: ConversationId, due_ms: u64) {
        if due_ms <= self.ctx.now_ms() {
            self.dispatch_turn(id);
        } else {
            self.due_turns.insert((due_ms, id));
        }
    }

    fn dispatch_due_turns(&mut self) {
        let now = self.ctx.now_ms();
        while let Some(&(due_ms, id)) = self.due_turns.first() {
            if due_ms > now {
                break;
            }
            self.due_turns.pop_first();
            self.dispatch_turn(id);
        }
    }

    fn dispatch_turn(&mut self, id: ConversationId) {
        match session::prepare_turn(&mut self.ctx, id) {
            Some(TurnPlan::Ask(ticket, turn_ctx)) => {
                let reasoner = Arc::clone(&self.reasoner);
                self.spawn(async move {
                    let reply = reasoner.speak(turn_ctx).await;
                    Completion::Turn { ticket, reply }
                });
            }
            Some(TurnPlan::Ended(termination)) => self.synthesize_memories(&termination),
            None => {}
        }
    }

    fn synthesize_memories(&mut self, termination: &Termination) {
        let requests = memory::requests(&self.ctx, termination);
        if requests.is_empty() {
            return;
        }
        let contexts: Vec<SummaryContext> = requests.iter().map(|r| r.context.clone()).collect();
        let reasoner = Arc::clone(&self.reasoner);
        self.spawn(async move {
            let results = join_all(contexts.into_iter().map(|c| reasoner.summarize(c))).await;
            Completion::Memory {
                results: requests.into_iter().zip(results).collect(),
            }
        });
    }

    fn settle_flush(&mut self, marks: FlushMarks, result: Result<(), PersistError>) -> FlushOutcome {
        let outcome = self.ctx.sync.settle(marks, result);
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agora_types::{
        AgentState, CardId, EncounterStep, Position, SpeakerAction, StepType, SyncBatch,
    };
    use chrono::Utc;

    use super::*;
    use crate::config::SimulationConfig;
    use crate::reasoner::ScriptedReasoner;
    use crate::sync::MemorySink;

    fn simulation(reasoner: ScriptedReasoner) -> Simulation<ScriptedReasoner, MemorySink> {
        simulation_with(reasoner, Arc::new(MemorySink::new()))
    }

    fn simulation_with<S: PersistenceSink>(
        reasoner: ScriptedReasoner,
        sink: Arc<S>,
    ) -> Simulation<ScriptedReasoner, S> {
        let mut config = SimulationConfig::default();
        config.roster.truncate(2);
        config.conversation.turn_delay_ms = 0;
        let mut ctx = SimulationContext::new(config, Utc::now()).unwrap();
        for (agent, x) in ctx.agents.iter_mut().zip([100.0, 110.0]) {
            agent.position = Position::new(x, 100.0);
            agent.target = Position::new(x, 300.0);
        }
        Simulation::new(ctx, Arc::new(reasoner), sink)
    }

    #[tokio::test]
    async fn encounter_to_conversation_to_memory() {
        let leave = TurnReply {
            dialogue: String::from("Goodbye."),
            action: SpeakerAction::LeaveAndWander,
        };
        let mut sim = simulation(ScriptedReasoner::new().with_default_turn(leave));

        sim.tick().unwrap();
        assert!(sim.has_in_flight());
        sim.run_until_idle().await;

        let ctx = sim.context();
        assert!(ctx.conversations.is_empty());
        assert!(ctx.agents.iter().all(|a| a.state == AgentState::Wandering));
        assert!(ctx.agents.iter().all(|a| a.memory.len() == 1));
        assert_eq!(ctx.sync.conversation_inits().len(), 1);
        assert_eq!(ctx.sync.conversation_messages().len(), 1);
        assert!(ctx.invariant_violations().is_empty());
    }

    #[tokio::test]
    async fn delayed_turns_wait_for_their_tick() {
        let mut sim = simulation(ScriptedReasoner::new());
        sim.context_mut().config.conversation.turn_delay_ms = 250;

        sim.tick().unwrap();
        sim.run_until_idle().await;
        assert_eq!(sim.reasoner.speak_calls(), 1);

        sim.tick().unwrap();
        sim.run_until_idle().await;
        assert_eq!(sim.reasoner.speak_calls(), 1);

        for _ in 0..3 {
            sim.tick().unwrap();
        }
        sim.run_until_idle().await;
        assert_eq!(sim.reasoner.speak_calls(), 2);
    }

    #[tokio::test]
    async fn flush_now_command_reports_outcome() {
        let mut sim = simulation(ScriptedReasoner::new().with_default_decision(false));
        sim.tick().unwrap();
        sim.run_until_idle().await;
        assert!(!sim.context().sync.is_empty());

        let (tx, rx) = oneshot::channel();
        sim.handle(Command::FlushNow { respond_to: tx });
        sim.run_until_idle().await;
        assert!(matches!(rx.await.unwrap(), FlushOutcome::Flushed { .. }));
        assert!(sim.context().sync.is_empty());

        let (tx, rx) = oneshot::channel();
        sim.handle(Command::FlushNow { respond_to: tx });
        assert_eq!(rx.await.unwrap(), FlushOutcome::Empty);
    }

    #[tokio::test]
    async fn shutdown_flushes_and_stops_new_work() {
        let mut sim = simulation(ScriptedReasoner::new());
        sim.tick().unwrap();
        let outcome = sim.shutdown().await;
        assert!(matches!(outcome, FlushOutcome::Flushed { .. }));
        sim.tick().unwrap();
        assert!(!sim.has_in_flight());
    }

    #[tokio::test]
    async fn ticks_after_shutdown_leave_agents_free() {
        let mut sim = simulation(ScriptedReasoner::new());
        let outcome = sim.shutdown().await;
        assert_eq!(outcome, FlushOutcome::Empty);

        assert_eq!(sim.tick().unwrap(), 0);
        let ctx = sim.context();
        assert!(ctx.agents.iter().all(|a| a.state == AgentState::Wandering));
        assert!(ctx.sync.is_empty());
        assert!(ctx.invariant_violations().is_empty());
        assert!(!sim.has_in_flight());
    }

    fn extra_step() -> EncounterStep {
        EncounterStep {
            card_id: CardId::new(),
            step_type: StepType::Encounter,
            agent_name: None,
            message: String::from("pushed mid-flight"),
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn background_flush_failure_keeps_records_for_retry() {
        let sink = Arc::new(MemorySink::new());
        let mut sim = simulation_with(
            ScriptedReasoner::new().with_default_decision(false),
            Arc::clone(&sink),
        );
        sim.tick().unwrap();
        sim.run_until_idle().await;
        let queued = sim.context().sync.depths().total();
        assert!(queued > 0);

        sink.set_failing(true);
        assert!(sim.start_flush());
        sim.context_mut().sync.push_encounter_step(extra_step());
        sim.run_until_idle().await;
        assert_eq!(sim.context().sync.depths().total(), queued.saturating_add(1));
        assert!(!sim.context().sync.is_in_flight());

        sink.set_failing(false);
        assert!(sim.start_flush());
        sim.context_mut().sync.push_encounter_step(extra_step());
        sim.run_until_idle().await;

        let left = sim.context().sync.encounter_steps();
        assert_eq!(sim.context().sync.depths().total(), 1);
        assert_eq!(left.first().unwrap().message, "pushed mid-flight");
        assert_eq!(sink.calls(), 2);
        let persisted = sink.batches();
        assert_eq!(persisted.len(), 1);
        let mid_flight = persisted
            .first()
            .unwrap()
            .encounter_steps
            .iter()
            .filter(|step| step.message == "pushed mid-flight")
            .count();
        assert_eq!(mid_flight, 1);
    }

    /// A sink whose writes never complete.
    struct StalledSink;

    impl PersistenceSink for StalledSink {
        async fn persist(&self, _batch: &SyncBatch) -> Result<(), PersistError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_flush_times_out_without_losing_records() {
        let mut sim = simulation_with(
            ScriptedReasoner::new().with_default_decision(false),
            Arc::new(StalledSink),
        );
        sim.tick().unwrap();
        sim.run_until_idle().await;
        let queued = sim.context().sync.depths().total();

        let (tx, rx) = oneshot::channel();
        sim.handle(Command::FlushNow { respond_to: tx });
        assert!(sim.context().sync.is_in_flight());
        sim.run_until_idle().await;

        assert_eq!(
            rx.await.unwrap(),
            FlushOutcome::Failed {
                error: PersistError::Timeout { deadline_ms: 10_000 },
            }
        );
        assert_eq!(sim.context().sync.depths().total(), queued);
        assert!(!sim.context().sync.is_in_flight());
    }
}

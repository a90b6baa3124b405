//! Write-behind sync queue and the persistence seam.
//!
//! Producers push records the instant a fact occurs. A periodic flush
//! snapshots every buffer into one [`SyncBatch`] and submits it to a
//! [`PersistenceSink`]. Exactly the records that were part of a successful
//! flush are removed; anything pushed while the flush was in flight stays
//! for the next one. A failed flush removes nothing, so the next interval
//! retries the same (possibly grown) buffers.
//!
//! Delivery is at-least-once. FIFO order holds within each buffer.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use agora_types::{
    AgentMemory, ConversationInit, ConversationMessage, EncounterStep, PrivateMessage, SyncBatch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Errors a persistence sink may report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// The backing store rejected or failed the batch.
    #[error("persistence backend error: {0}")]
    Backend(String),

    /// The flush did not complete within its deadline.
    #[error("persistence timed out (deadline: {deadline_ms}ms)")]
    Timeout {
        /// The deadline in milliseconds.
        deadline_ms: u64,
    },
}

/// A durable destination for sync batches.
///
/// A batch is all-or-nothing: an error means nothing from it may be assumed
/// stored. Replaying a batch must not duplicate records that carry a natural
/// key.
pub trait PersistenceSink: Send + Sync + 'static {
    /// Persist every record in `batch` in one unit.
    fn persist(&self, batch: &SyncBatch) -> impl Future<Output = Result<(), PersistError>> + Send;
}

/// Per-buffer record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepths {
    /// Queued conversation inits.
    pub conversation_inits: usize,
    /// Queued conversation messages.
    pub conversation_messages: usize,
    /// Queued agent memories.
    pub agent_memories: usize,
    /// Queued encounter steps.
    pub encounter_steps: usize,
    /// Queued private messages.
    pub private_messages: usize,
}

impl QueueDepths {
    /// Sum across all buffers.
    pub const fn total(&self) -> usize {
        self.conversation_inits
            .saturating_add(self.conversation_messages)
            .saturating_add(self.agent_memories)
            .saturating_add(self.encounter_steps)
            .saturating_add(self.private_messages)
    }
}

/// How many records of each buffer a flush covers.
///
/// Returned by [`SyncQueue::begin_flush`] and handed back to
/// [`SyncQueue::finish_flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushMarks(QueueDepths);

impl FlushMarks {
    /// Number of records covered by the flush.
    pub const fn records(&self) -> usize {
        self.0.total()
    }
}

/// Result of a flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every buffer was empty; the sink was not called.
    Empty,
    /// Another flush is still in flight; nothing was submitted.
    InFlight,
    /// The sink accepted the batch and the covered records were removed.
    Flushed {
        /// Number of records persisted.
        records: usize,
    },
    /// The sink failed; every record was kept for retry.
    Failed {
        /// Why the sink failed.
        error: PersistError,
    },
}

/// Five append-only buffers, one per record kind.
#[derive(Debug, Default)]
pub struct SyncQueue {
    conversation_inits: Vec<ConversationInit>,
    conversation_messages: Vec<ConversationMessage>,
    agent_memories: Vec<AgentMemory>,
    encounter_steps: Vec<EncounterStep>,
    private_messages: Vec<PrivateMessage>,
    in_flight: bool,
    backlog_warn_threshold: usize,
}

impl SyncQueue {
    /// An empty queue that warns once the backlog exceeds `backlog_warn_threshold`.
    pub fn new(backlog_warn_threshold: usize) -> Self {
        Self {
            backlog_warn_threshold,
            ..Self::default()
        }
    }

    /// Queue a conversation creation.
    pub fn push_conversation_init(&mut self, record: ConversationInit) {
        self.conversation_inits.push(record);
    }

    /// Queue a conversation line.
    pub fn push_conversation_message(&mut self, record: ConversationMessage) {
        self.conversation_messages.push(record);
    }

    /// Queue a new agent memory.
    pub fn push_agent_memory(&mut self, record: AgentMemory) {
        self.agent_memories.push(record);
    }

    /// Queue an encounter lifecycle step.
    pub fn push_encounter_step(&mut self, record: EncounterStep) {
        self.encounter_steps.push(record);
    }

    /// Queue a private chat line.
    pub fn push_private_message(&mut self, record: PrivateMessage) {
        self.private_messages.push(record);
    }

    /// Current record counts.
    pub const fn depths(&self) -> QueueDepths {
        QueueDepths {
            conversation_inits: self.conversation_inits.len(),
            conversation_messages: self.conversation_messages.len(),
            agent_memories: self.agent_memories.len(),
            encounter_steps: self.encounter_steps.len(),
            private_messages: self.private_messages.len(),
        }
    }

    /// Whether every buffer is empty.
    pub const fn is_empty(&self) -> bool {
        self.depths().total() == 0
    }

    /// Whether a flush is in flight.
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Queued conversation messages, oldest first.
    pub fn conversation_messages(&self) -> &[ConversationMessage] {
        &self.conversation_messages
    }

    /// Queued encounter steps, oldest first.
    pub fn encounter_steps(&self) -> &[EncounterStep] {
        &self.encounter_steps
    }

    /// Queued agent memories, oldest first.
    pub fn agent_memories(&self) -> &[AgentMemory] {
        &self.agent_memories
    }

    /// Queued private messages, oldest first.
    pub fn private_messages(&self) -> &[PrivateMessage] {
        &self.private_messages
    }

    /// Queued conversation inits, oldest first.
    pub fn conversation_inits(&self) -> &[ConversationInit] {
        &self.conversation_inits
    }

    /// Snapshot every buffer for submission.
    ///
    /// Returns `None` without side effects if the queue is empty or a flush
    /// is already in flight. Otherwise marks a flush as in flight until
    /// [`finish_flush`](Self::finish_flush) is called.
    pub fn begin_flush(&mut self) -> Option<(SyncBatch, FlushMarks)> {
        if self.in_flight || self.is_empty() {
            return None;
        }
        let marks = FlushMarks(self.depths());
        if marks.records() > self.backlog_warn_threshold {
            warn!(
                records = marks.records(),
                threshold = self.backlog_warn_threshold,
                "sync backlog above threshold"
            );
        }
        self.in_flight = true;
        let batch = SyncBatch {
            conversation_inits: self.conversation_inits.clone(),
            conversation_messages: self.conversation_messages.clone(),
            agent_memories: self.agent_memories.clone(),
            encounter_steps: self.encounter_steps.clone(),
            private_messages: self.private_messages.clone(),
        };
        Some((batch, marks))
    }

    /// Settle the in-flight flush.
    ///
    /// On success the first `marks` records of each buffer are removed;
    /// records pushed since [`begin_flush`](Self::begin_flush) stay queued.
    /// On failure nothing is removed.
    pub fn finish_flush(&mut self, marks: FlushMarks, succeeded: bool) {
        self.in_flight = false;
        if !succeeded {
            return;
        }
        let FlushMarks(depths) = marks;
        drain_front(&mut self.conversation_inits, depths.conversation_inits);
        drain_front(&mut self.conversation_messages, depths.conversation_messages);
        drain_front(&mut self.agent_memories, depths.agent_memories);
        drain_front(&mut self.encounter_steps, depths.encounter_steps);
        drain_front(&mut self.private_messages, depths.private_messages);
    }

    /// Flush inline: snapshot, persist, settle.
    pub async fn flush_now<S: PersistenceSink>(&mut self, sink: &S) -> FlushOutcome {
        if self.in_flight {
            return FlushOutcome::InFlight;
        }
        let Some((batch, marks)) = self.begin_flush() else {
            return FlushOutcome::Empty;
        };
        let result = sink.persist(&batch).await;
        self.settle(marks, result)
    }

    /// Settle a flush from the sink's result and log the outcome.
    pub fn settle(&mut self, marks: FlushMarks, result: Result<(), PersistError>) -> FlushOutcome {
        match result {
            Ok(()) => {
                self.finish_flush(marks, true);
                debug!(records = marks.records(), "sync flush succeeded");
                FlushOutcome::Flushed {
                    records: marks.records(),
                }
            }
            Err(error) => {
                self.finish_flush(marks, false);
                warn!(
                    records = marks.records(),
                    error = %error,
                    "sync flush failed, keeping records for retry"
                );
                FlushOutcome::Failed { error }
            }
        }
    }
}

/// Remove the first `count` elements, or all of them if fewer remain.
fn drain_front<T>(buffer: &mut Vec<T>, count: usize) {
    let end = count.min(buffer.len());
    buffer.drain(..end);
}

// ---------------------------------------------------------------------------
// In-memory sink
// ---------------------------------------------------------------------------

/// A sink that keeps batches in memory and can be told to fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<SyncBatch>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MemorySink {
    /// An empty, succeeding sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Number of persist calls received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Every batch accepted so far.
    pub fn batches(&self) -> Vec<SyncBatch> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }
}

impl PersistenceSink for MemorySink {
    async fn persist(&self, batch: &SyncBatch) -> Result<(), PersistError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if self.failing.load(Ordering::Acquire) {
            return Err(PersistError::Backend(String::from("sink unavailable")));
        }
        self.batches
            .lock()
            .map_err(|_poisoned| PersistError::Backend(String::from("sink lock poisoned")))?
            .push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agora_types::{ConversationId, SenderType};
    use chrono::Utc;

    use super::*;

    fn message(conversation_id: ConversationId, turn_index: u32) -> ConversationMessage {
        ConversationMessage {
            conversation_id,
            turn_index,
            sender_agent_id: None,
            sender_type: SenderType::Agent,
            content: format!("line {turn_index}"),
            ts: Utc::now(),
        }
    }

    #[test]
    fn empty_queue_has_nothing_to_flush() {
        let mut queue = SyncQueue::new(100);
        assert!(queue.is_empty());
        assert!(queue.begin_flush().is_none());
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn records_pushed_during_flush_survive_success() {
        let mut queue = SyncQueue::new(100);
        let id = ConversationId::new();
        queue.push_conversation_message(message(id, 0));
        queue.push_conversation_message(message(id, 1));

        let (batch, marks) = queue.begin_flush().unwrap();
        assert_eq!(batch.conversation_messages.len(), 2);
        assert!(queue.begin_flush().is_none());

        queue.push_conversation_message(message(id, 2));
        queue.finish_flush(marks, true);

        let remaining: Vec<u32> = queue
            .conversation_messages()
            .iter()
            .map(|m| m.turn_index)
            .collect();
        assert_eq!(remaining, [2]);
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn failed_flush_keeps_everything() {
        let mut queue = SyncQueue::new(100);
        let id = ConversationId::new();
        queue.push_conversation_message(message(id, 0));
        let (_, marks) = queue.begin_flush().unwrap();
        queue.push_conversation_message(message(id, 1));
        queue.finish_flush(marks, false);
        assert_eq!(queue.depths().conversation_messages, 2);
    }

    #[tokio::test]
    async fn flush_now_round_trip_through_memory_sink() {
        let sink = MemorySink::new();
        let mut queue = SyncQueue::new(100);
        queue.push_conversation_message(message(ConversationId::new(), 0));

        assert_eq!(queue.flush_now(&sink).await, FlushOutcome::Flushed { records: 1 });
        assert_eq!(queue.flush_now(&sink).await, FlushOutcome::Empty);
        assert_eq!(sink.calls(), 1);
        assert_eq!(sink.batches().len(), 1);
    }
}

//! Batched persistence of sync queue records.
//!
//! A [`SyncBatch`] is written in a single transaction: either every record
//! in it is committed or none is, so the caller can keep the whole batch
//! for retry after any failure.
//!
//! | Table | Key | Write |
//! |-------|-----|-------|
//! | `conversations` | `id` | upsert |
//! | `conversation_participants` | `(conversation_id, agent_id)` | upsert |
//! | `conversation_messages` | `(conversation_id, turn_index)` | upsert |
//! | `agent_memories` | serial | insert |
//! | `encounter_card_steps` | serial | insert |
//! | `private_chat_messages` | `(session_id, client_message_id)` | upsert |
//!
//! Each table is written with one `UNNEST` statement per batch.

use agora_types::{
    AgentId, AgentMemory, ConversationId, ConversationInit, ConversationMessage, EncounterStep,
    PrivateMessage, SyncBatch,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::DbError;

/// Writes sync batches to `PostgreSQL`.
pub struct SyncStore<'a> {
    pool: &'a PgPool,
}

impl<'a> SyncStore<'a> {
    /// Create a new sync store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist every record of `batch` in one transaction.
    ///
    /// Conversations are written before their participants and messages.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if any statement fails. Nothing from the
    /// batch is committed in that case.
    pub async fn persist_batch(&self, batch: &SyncBatch) -> Result<(), DbError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        upsert_conversations(&mut tx, &batch.conversation_inits).await?;
        upsert_messages(&mut tx, &batch.conversation_messages).await?;
        insert_memories(&mut tx, &batch.agent_memories).await?;
        insert_steps(&mut tx, &batch.encounter_steps).await?;
        upsert_private_messages(&mut tx, &batch.private_messages).await?;
        tx.commit().await?;

        tracing::debug!(
            conversations = batch.conversation_inits.len(),
            messages = batch.conversation_messages.len(),
            memories = batch.agent_memories.len(),
            steps = batch.encounter_steps.len(),
            private_messages = batch.private_messages.len(),
            "Persisted sync batch"
        );
        Ok(())
    }

    /// Count stored messages of one conversation.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count_messages(&self, conversation_id: ConversationId) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            r"SELECT COUNT(*) FROM conversation_messages WHERE conversation_id = $1",
        )
        .bind(conversation_id.into_inner())
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Load an agent's stored memories, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn agent_memories(&self, agent_id: AgentId) -> Result<Vec<String>, DbError> {
        let rows: Vec<String> = sqlx::query_scalar(
            r"SELECT content FROM agent_memories WHERE agent_id = $1 ORDER BY created_at, id",
        )
        .bind(agent_id.into_inner())
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

async fn upsert_conversations(
    conn: &mut PgConnection,
    inits: &[ConversationInit],
) -> Result<(), DbError> {
    if inits.is_empty() {
        return Ok(());
    }

    let mut ids = Vec::with_capacity(inits.len());
    let mut card_ids: Vec<Option<Uuid>> = Vec::with_capacity(inits.len());
    let mut created = Vec::with_capacity(inits.len());
    let mut seat_conversations = Vec::new();
    let mut seat_agents = Vec::new();
    let mut seats: Vec<i32> = Vec::new();

    for init in inits {
        ids.push(init.conversation_id.into_inner());
        card_ids.push(init.card_id.map(agora_types::CardId::into_inner));
        created.push(init.created_at);
        for (seat, agent) in init.participant_agent_ids.iter().enumerate() {
            seat_conversations.push(init.conversation_id.into_inner());
            seat_agents.push(agent.into_inner());
            seats.push(i32::try_from(seat).unwrap_or(i32::MAX));
        }
    }

    sqlx::query(
        r"INSERT INTO conversations (id, card_id, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::TIMESTAMPTZ[])
          ON CONFLICT (id) DO UPDATE SET card_id = EXCLUDED.card_id",
    )
    .bind(&ids)
    .bind(&card_ids)
    .bind(&created)
    .execute(&mut *conn)
    .await?;

    if !seat_conversations.is_empty() {
        sqlx::query(
            r"INSERT INTO conversation_participants (conversation_id, agent_id, seat)
              SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::INTEGER[])
              ON CONFLICT (conversation_id, agent_id) DO NOTHING",
        )
        .bind(&seat_conversations)
        .bind(&seat_agents)
        .bind(&seats)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn upsert_messages(
    conn: &mut PgConnection,
    messages: &[ConversationMessage],
) -> Result<(), DbError> {
    if messages.is_empty() {
        return Ok(());
    }

    let len = messages.len();
    let mut conversations = Vec::with_capacity(len);
    let mut turns = Vec::with_capacity(len);
    let mut senders: Vec<Option<Uuid>> = Vec::with_capacity(len);
    let mut sender_types = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut created = Vec::with_capacity(len);

    for message in messages {
        conversations.push(message.conversation_id.into_inner());
        turns.push(i64::from(message.turn_index));
        senders.push(message.sender_agent_id.map(AgentId::into_inner));
        sender_types.push(message.sender_type.as_str());
        contents.push(message.content.as_str());
        created.push(message.ts);
    }

    sqlx::query(
        r"INSERT INTO conversation_messages (conversation_id, turn_index, sender_agent_id, sender_type, content, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::BIGINT[], $3::UUID[], $4::TEXT[], $5::TEXT[], $6::TIMESTAMPTZ[])
          ON CONFLICT (conversation_id, turn_index) DO UPDATE SET
              sender_agent_id = EXCLUDED.sender_agent_id,
              sender_type = EXCLUDED.sender_type,
              content = EXCLUDED.content,
              created_at = EXCLUDED.created_at",
    )
    .bind(&conversations)
    .bind(&turns)
    .bind(&senders)
    .bind(&sender_types)
    .bind(&contents)
    .bind(&created)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_memories(conn: &mut PgConnection, memories: &[AgentMemory]) -> Result<(), DbError> {
    if memories.is_empty() {
        return Ok(());
    }

    let len = memories.len();
    let mut agents = Vec::with_capacity(len);
    let mut conversations: Vec<Option<Uuid>> = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut created = Vec::with_capacity(len);

    for memory in memories {
        agents.push(memory.agent_id.into_inner());
        conversations.push(memory.conversation_id.map(ConversationId::into_inner));
        sources.push(memory.source_type.as_str());
        contents.push(memory.content.as_str());
        created.push(memory.ts);
    }

    sqlx::query(
        r"INSERT INTO agent_memories (agent_id, conversation_id, source_type, content, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::TEXT[], $4::TEXT[], $5::TIMESTAMPTZ[])",
    )
    .bind(&agents)
    .bind(&conversations)
    .bind(&sources)
    .bind(&contents)
    .bind(&created)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_steps(conn: &mut PgConnection, steps: &[EncounterStep]) -> Result<(), DbError> {
    if steps.is_empty() {
        return Ok(());
    }

    let len = steps.len();
    let mut cards = Vec::with_capacity(len);
    let mut step_types = Vec::with_capacity(len);
    let mut names: Vec<Option<&str>> = Vec::with_capacity(len);
    let mut messages = Vec::with_capacity(len);
    let mut created = Vec::with_capacity(len);

    for step in steps {
        cards.push(step.card_id.into_inner());
        step_types.push(step.step_type.as_str());
        names.push(step.agent_name.as_deref());
        messages.push(step.message.as_str());
        created.push(step.ts);
    }

    sqlx::query(
        r"INSERT INTO encounter_card_steps (card_id, step_type, agent_name, message, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::TIMESTAMPTZ[])",
    )
    .bind(&cards)
    .bind(&step_types)
    .bind(&names)
    .bind(&messages)
    .bind(&created)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_private_messages(
    conn: &mut PgConnection,
    messages: &[PrivateMessage],
) -> Result<(), DbError> {
    if messages.is_empty() {
        return Ok(());
    }

    let len = messages.len();
    let mut sessions = Vec::with_capacity(len);
    let mut client_ids = Vec::with_capacity(len);
    let mut sender_types = Vec::with_capacity(len);
    let mut senders: Vec<Option<Uuid>> = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut created = Vec::with_capacity(len);

    for message in messages {
        sessions.push(message.session_id.into_inner());
        client_ids.push(message.client_message_id.into_inner());
        sender_types.push(message.sender_type.as_str());
        senders.push(message.sender_agent_id.map(AgentId::into_inner));
        contents.push(message.content.as_str());
        created.push(message.ts);
    }

    sqlx::query(
        r"INSERT INTO private_chat_messages (session_id, client_message_id, sender_type, sender_agent_id, content, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::TEXT[], $4::UUID[], $5::TEXT[], $6::TIMESTAMPTZ[])
          ON CONFLICT (session_id, client_message_id) DO NOTHING",
    )
    .bind(&sessions)
    .bind(&client_ids)
    .bind(&sender_types)
    .bind(&senders)
    .bind(&contents)
    .bind(&created)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

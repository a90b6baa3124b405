//! [`PersistenceSink`] that writes sync batches to `PostgreSQL`.

use agora_core::{PersistError, PersistenceSink};
use agora_db::SyncStore;
use agora_types::SyncBatch;
use sqlx::PgPool;

/// Persists each batch in one transaction through [`SyncStore`].
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    /// Create a sink over a connected pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PersistenceSink for PgSink {
    async fn persist(&self, batch: &SyncBatch) -> Result<(), PersistError> {
        SyncStore::new(&self.pool)
            .persist_batch(batch)
            .await
            .map_err(|e| PersistError::Backend(e.to_string()))
    }
}
